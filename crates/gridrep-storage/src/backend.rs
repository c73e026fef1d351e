//! The backend adapter capability set.
//!
//! One implementation per storage technology family; the operation engine
//! depends only on this trait. All operations are calls into an external
//! subsystem and translate its failures into [`StorageError`] variants.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    Checksum, DirectoryEntry, FileStat, PhysicalUrl, ReplicaState, StageStatus, StageTicket,
};

/// Uniform operation set over one storage technology family.
///
/// `stage`/`stage_status` are the only asynchronous-by-nature operations:
/// disk-family adapters complete them immediately, tape-family adapters
/// hand back a ticket that is polled until READY or the caller's deadline.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// List the entries under a physical directory URL.
    async fn list(&self, url: &PhysicalUrl) -> Result<Vec<DirectoryEntry>>;

    /// Whether a physical file exists. Directories report `false`.
    async fn exists(&self, url: &PhysicalUrl) -> Result<bool>;

    /// Size and modification time of a physical file.
    async fn stat(&self, url: &PhysicalUrl) -> Result<FileStat>;

    /// Backend-computed checksum of a replica.
    async fn checksum(&self, url: &PhysicalUrl) -> Result<Checksum>;

    /// Current accessibility of a replica.
    async fn state(&self, url: &PhysicalUrl) -> Result<ReplicaState>;

    /// Submit a bring-online request.
    ///
    /// Disk-family adapters return a ticket that polls READY immediately.
    async fn stage(&self, url: &PhysicalUrl) -> Result<StageTicket>;

    /// Poll an outstanding bring-online request.
    async fn stage_status(&self, ticket: &StageTicket) -> Result<StageStatus>;

    /// Copy a replica to a local file.
    async fn fetch(&self, url: &PhysicalUrl, local_dest: &Path) -> Result<()>;

    /// Copy a local file to a physical URL.
    async fn push(&self, local_src: &Path, url: &PhysicalUrl) -> Result<()>;

    /// Delete a physical replica.
    async fn delete(&self, url: &PhysicalUrl) -> Result<()>;
}
