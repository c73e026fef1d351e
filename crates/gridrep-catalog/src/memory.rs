//! In-process replica catalog.
//!
//! Backs tests and local dry-runs with the same contract as the grid
//! client. The directory tree is derived from the registered file paths,
//! so directories exist exactly while something lives under them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use gridrep_storage::{Checksum, DirectoryEntry, EntryKind, LogicalPath, PhysicalUrl};

use crate::client::ReplicaCatalog;
use crate::error::{CatalogError, Result};
use crate::replica::Replica;

#[derive(Debug, Clone)]
struct ReplicaEntry {
    se: String,
    url: PhysicalUrl,
}

#[derive(Debug, Clone)]
struct FileRecord {
    checksum: Checksum,
    replicas: Vec<ReplicaEntry>,
}

/// In-memory implementation of [`ReplicaCatalog`].
#[derive(Default)]
pub struct MemoryCatalog {
    files: RwLock<BTreeMap<LogicalPath, FileRecord>>,
}

impl MemoryCatalog {
    /// New empty catalog.
    pub fn new() -> Self {
        MemoryCatalog::default()
    }

    /// Create a logical entry with no replicas yet.
    ///
    /// Zero replicas is a valid state; `list_replicas` on such an entry
    /// returns an empty set rather than `NotFound`.
    pub fn create_entry(&self, path: &LogicalPath, checksum: Checksum) {
        self.files
            .write()
            .entry(path.clone())
            .or_insert_with(|| FileRecord {
                checksum,
                replicas: Vec::new(),
            });
    }

    /// Number of replica records for a file, 0 when absent.
    pub fn replica_count(&self, path: &LogicalPath) -> usize {
        self.files
            .read()
            .get(path)
            .map_or(0, |record| record.replicas.len())
    }

    fn children_of(&self, path: &LogicalPath) -> Vec<DirectoryEntry> {
        let files = self.files.read();
        let prefix = if path.as_str() == "/" {
            "/".to_string()
        } else {
            format!("{}/", path.as_str())
        };
        // BTreeMap iteration gives lexical order for free.
        let mut entries: Vec<DirectoryEntry> = Vec::new();
        for key in files.keys() {
            let Some(rest) = key.as_str().strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                None => entries.push(DirectoryEntry::file(rest, 0)),
                Some((dir, _)) => {
                    if entries
                        .last()
                        .map_or(true, |e| e.name != dir || e.kind != EntryKind::Directory)
                    {
                        entries.push(DirectoryEntry::directory(dir));
                    }
                }
            }
        }
        entries
    }
}

#[async_trait]
impl ReplicaCatalog for MemoryCatalog {
    async fn list_dir(&self, path: &LogicalPath) -> Result<Vec<DirectoryEntry>> {
        match self.entry_kind(path).await? {
            EntryKind::Directory => Ok(self.children_of(path)),
            EntryKind::File => Err(CatalogError::Parse {
                detail: format!("{} is a file, not a directory", path),
            }),
        }
    }

    async fn entry_kind(&self, path: &LogicalPath) -> Result<EntryKind> {
        if path.as_str() == "/" {
            return Ok(EntryKind::Directory);
        }
        if self.files.read().contains_key(path) {
            return Ok(EntryKind::File);
        }
        if !self.children_of(path).is_empty() {
            return Ok(EntryKind::Directory);
        }
        Err(CatalogError::NotFound {
            path: path.as_str().to_string(),
        })
    }

    async fn list_replicas(&self, path: &LogicalPath) -> Result<Vec<Replica>> {
        let files = self.files.read();
        let record = files.get(path).ok_or_else(|| CatalogError::NotFound {
            path: path.as_str().to_string(),
        })?;
        Ok(record
            .replicas
            .iter()
            .map(|entry| {
                Replica::new(
                    path.clone(),
                    &entry.se,
                    entry.url.clone(),
                    record.checksum.clone(),
                )
            })
            .collect())
    }

    async fn register_replica(
        &self,
        path: &LogicalPath,
        se: &str,
        url: &PhysicalUrl,
        checksum: &Checksum,
    ) -> Result<()> {
        let mut files = self.files.write();
        let record = files.entry(path.clone()).or_insert_with(|| FileRecord {
            checksum: checksum.clone(),
            replicas: Vec::new(),
        });
        if !record.checksum.is_known() {
            record.checksum = checksum.clone();
        }
        // Exactly one record per (file, element) pair.
        match record.replicas.iter_mut().find(|entry| entry.se == se) {
            Some(entry) => entry.url = url.clone(),
            None => record.replicas.push(ReplicaEntry {
                se: se.to_string(),
                url: url.clone(),
            }),
        }
        Ok(())
    }

    async fn remove_replica_entry(&self, path: &LogicalPath, se: &str) -> Result<()> {
        let mut files = self.files.write();
        if let Some(record) = files.get_mut(path) {
            record.replicas.retain(|entry| entry.se != se);
        }
        Ok(())
    }

    async fn remove_entry(&self, path: &LogicalPath) -> Result<()> {
        self.files.write().remove(path);
        Ok(())
    }
}
