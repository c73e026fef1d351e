//! Path resolver: expands a logical root into an ordered, deduplicated
//! sequence of file paths.
//!
//! Single pass over catalog state at call time; concurrent catalog
//! mutation can make the result stale, which is accepted. Directory
//! entries are visited in lexical order so bulk-operation reports are
//! reproducible. Listings are served from the directory cache when fresh.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

use gridrep_catalog::{DirCache, ReplicaCatalog};
use gridrep_storage::{DirectoryEntry, EntryKind, LogicalPath};

use crate::error::{EngineError, Result};

/// Expands logical roots into file sequences.
pub struct Walker {
    catalog: Arc<dyn ReplicaCatalog>,
    cache: Arc<DirCache>,
}

impl Walker {
    /// New walker over `catalog`, caching listings in `cache`.
    pub fn new(catalog: Arc<dyn ReplicaCatalog>, cache: Arc<DirCache>) -> Self {
        Walker { catalog, cache }
    }

    /// Cached, lexically sorted listing of a logical directory.
    ///
    /// Also the entry point interactive completion uses.
    pub async fn list(&self, path: &LogicalPath) -> Result<Vec<DirectoryEntry>> {
        if let Some(entries) = self.cache.get(path) {
            return Ok(entries);
        }
        let mut entries = self.catalog.list_dir(path).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        self.cache.insert(path, entries.clone());
        Ok(entries)
    }

    /// Start a single-pass walk. An invalid regex fails here, before any
    /// traversal happens.
    pub async fn walk(
        &self,
        root: &LogicalPath,
        recursive: bool,
        filter: Option<&str>,
    ) -> Result<Walk<'_>> {
        let regex = match filter {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| EngineError::Configuration {
                reason: format!("invalid filter pattern {:?}: {}", pattern, e),
            })?),
            None => None,
        };

        let mut walk = Walk {
            walker: self,
            regex,
            recursive,
            root_file: None,
            stack: Vec::new(),
            seen: HashSet::new(),
        };
        match self.catalog.entry_kind(root).await? {
            EntryKind::File => walk.root_file = Some(root.clone()),
            EntryKind::Directory => {
                let entries = self.list(root).await?;
                walk.stack.push(Frame {
                    path: root.clone(),
                    entries,
                    next: 0,
                });
            }
        }
        Ok(walk)
    }

    /// Expand `root` into the full ordered file list.
    pub async fn resolve(
        &self,
        root: &LogicalPath,
        recursive: bool,
        filter: Option<&str>,
    ) -> Result<Vec<LogicalPath>> {
        let mut walk = self.walk(root, recursive, filter).await?;
        let mut paths = Vec::new();
        while let Some(path) = walk.next_path().await? {
            paths.push(path);
        }
        Ok(paths)
    }
}

struct Frame {
    path: LogicalPath,
    entries: Vec<DirectoryEntry>,
    next: usize,
}

/// One in-progress traversal. Not restartable; results reflect catalog
/// state as directories are listed.
pub struct Walk<'a> {
    walker: &'a Walker,
    regex: Option<Regex>,
    recursive: bool,
    root_file: Option<LogicalPath>,
    stack: Vec<Frame>,
    seen: HashSet<LogicalPath>,
}

impl Walk<'_> {
    fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().map_or(true, |re| re.is_match(name))
    }

    /// The next matching file path, or `None` when the walk is done.
    pub async fn next_path(&mut self) -> Result<Option<LogicalPath>> {
        if let Some(root) = self.root_file.take() {
            if self.matches(root.base_name()) {
                return Ok(Some(root));
            }
            return Ok(None);
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            if frame.next >= frame.entries.len() {
                self.stack.pop();
                continue;
            }
            let entry = frame.entries[frame.next].clone();
            frame.next += 1;
            let child = frame.path.join(&entry.name);
            match entry.kind {
                EntryKind::File => {
                    if self.matches(&entry.name) && self.seen.insert(child.clone()) {
                        return Ok(Some(child));
                    }
                }
                EntryKind::Directory if self.recursive => {
                    let entries = self.walker.list(&child).await?;
                    self.stack.push(Frame {
                        path: child,
                        entries,
                        next: 0,
                    });
                }
                EntryKind::Directory => {
                    // Non-recursive walks only yield immediate file children.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use gridrep_catalog::MemoryCatalog;
    use gridrep_storage::Checksum;

    fn p(path: &str) -> LogicalPath {
        LogicalPath::new(path).unwrap()
    }

    fn catalog_with(paths: &[&str]) -> Arc<MemoryCatalog> {
        let catalog = MemoryCatalog::new();
        for path in paths {
            catalog.create_entry(&p(path), Checksum::new("00000000"));
        }
        Arc::new(catalog)
    }

    fn walker(catalog: Arc<MemoryCatalog>) -> Walker {
        Walker::new(catalog, Arc::new(DirCache::default()))
    }

    #[tokio::test]
    async fn test_regex_filter_yields_expected_set_in_order() {
        let catalog = catalog_with(&[
            "/data/test1.txt",
            "/data/test2.txt",
            "/data/test4.txt",
            "/data/other.dat",
        ]);
        let walker = walker(catalog);
        let paths = walker
            .resolve(&p("/data"), true, Some(r"test[1-3]\.txt"))
            .await
            .unwrap();
        assert_eq!(paths, vec![p("/data/test1.txt"), p("/data/test2.txt")]);
    }

    #[tokio::test]
    async fn test_recursive_walk_is_lexical_and_deep() {
        let catalog = catalog_with(&[
            "/data/b/deep.gz",
            "/data/a.gz",
            "/data/c.gz",
            "/data/b/a.gz",
        ]);
        let walker = walker(catalog);
        let paths = walker.resolve(&p("/data"), true, None).await.unwrap();
        assert_eq!(
            paths,
            vec![
                p("/data/a.gz"),
                p("/data/b/a.gz"),
                p("/data/b/deep.gz"),
                p("/data/c.gz"),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_recursive_skips_directories() {
        let catalog = catalog_with(&["/data/a.gz", "/data/sub/b.gz"]);
        let walker = walker(catalog);
        let paths = walker.resolve(&p("/data"), false, None).await.unwrap();
        assert_eq!(paths, vec![p("/data/a.gz")]);
    }

    #[tokio::test]
    async fn test_root_file_yields_itself() {
        let catalog = catalog_with(&["/data/a.gz"]);
        let walker = walker(catalog);
        let paths = walker.resolve(&p("/data/a.gz"), true, None).await.unwrap();
        assert_eq!(paths, vec![p("/data/a.gz")]);
    }

    #[tokio::test]
    async fn test_root_file_respects_filter() {
        let catalog = catalog_with(&["/data/a.gz"]);
        let walker = walker(catalog);
        let paths = walker
            .resolve(&p("/data/a.gz"), true, Some(r"\.txt$"))
            .await
            .unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_regex_fails_before_traversal() {
        let catalog = catalog_with(&["/data/a.gz"]);
        let walker = walker(catalog);
        let err = walker
            .resolve(&p("/data"), true, Some("test[1-"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_missing_root_propagates_not_found() {
        let catalog = catalog_with(&["/data/a.gz"]);
        let walker = walker(catalog);
        let err = walker.resolve(&p("/nowhere"), true, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Catalog(_)));
    }

    #[tokio::test]
    async fn test_listings_served_from_cache_on_second_walk() {
        let catalog = catalog_with(&["/data/a.gz", "/data/b.gz"]);
        let cache = Arc::new(DirCache::default());
        let walker = Walker::new(catalog, Arc::clone(&cache));

        walker.resolve(&p("/data"), true, None).await.unwrap();
        let misses_after_first = cache.stats().misses;
        walker.resolve(&p("/data"), true, None).await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, misses_after_first);
        assert!(stats.hits >= 1);
    }
}
