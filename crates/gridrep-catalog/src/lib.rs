#![warn(missing_docs)]

//! GridRep catalog subsystem: replica catalog clients and the directory
//! entry cache.
//!
//! The replica catalog is external, authoritative, remote state; this
//! crate only holds clients for it plus a short-lived listing cache for
//! walkers and interactive completion.

pub mod cache;
pub mod client;
pub mod error;
pub mod memory;
pub mod replica;

pub use cache::{DirCache, DirCacheConfig, DirCacheStats};
pub use client::{GridCatalog, ReplicaCatalog};
pub use error::{CatalogError, Result};
pub use memory::MemoryCatalog;
pub use replica::Replica;
