//! Short-lived cache of directory listings.
//!
//! Keeps walks and interactive completion snappy without hammering the
//! catalog. Entries are immutable once inserted and live until TTL expiry
//! or explicit invalidation after a mutating operation on the path.
//! Never consulted for the authoritative existence check of a write or
//! delete target; that truth always comes from the catalog client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use gridrep_storage::{DirectoryEntry, LogicalPath};

/// Configuration for the directory entry cache.
#[derive(Debug, Clone)]
pub struct DirCacheConfig {
    /// How long a listing stays valid.
    pub ttl: Duration,
    /// Maximum number of cached listings.
    pub max_entries: usize,
    /// Whether the cache is enabled at all.
    pub enabled: bool,
}

impl Default for DirCacheConfig {
    fn default() -> Self {
        DirCacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 4096,
            enabled: true,
        }
    }
}

/// Cache hit/miss counters, exposed for logging.
#[derive(Debug, Clone, Default)]
pub struct DirCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to go to the catalog.
    pub misses: u64,
    /// Listings inserted.
    pub inserts: u64,
    /// Listings dropped by explicit invalidation.
    pub invalidations: u64,
    /// Listings dropped because their TTL passed.
    pub expirations: u64,
}

struct CacheSlot {
    entries: Vec<DirectoryEntry>,
    inserted_at: Instant,
}

/// TTL cache of directory listings keyed by logical path.
///
/// Safe under concurrent walkers; reads clone the listing out so no lock
/// is held while the caller works through it.
pub struct DirCache {
    config: DirCacheConfig,
    slots: RwLock<HashMap<LogicalPath, CacheSlot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    invalidations: AtomicU64,
    expirations: AtomicU64,
}

impl DirCache {
    /// New cache with the given configuration.
    pub fn new(config: DirCacheConfig) -> Self {
        DirCache {
            config,
            slots: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Fresh listing for `path`, if one is cached.
    pub fn get(&self, path: &LogicalPath) -> Option<Vec<DirectoryEntry>> {
        if !self.config.enabled {
            return None;
        }
        let slots = self.slots.read();
        match slots.get(path) {
            Some(slot) if slot.inserted_at.elapsed() <= self.config.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(slot.entries.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Cache a listing for `path`.
    pub fn insert(&self, path: &LogicalPath, entries: Vec<DirectoryEntry>) {
        if !self.config.enabled {
            return;
        }
        let mut slots = self.slots.write();
        if slots.len() >= self.config.max_entries {
            self.sweep_locked(&mut slots);
            if slots.len() >= self.config.max_entries {
                // Still full of fresh listings; drop the oldest one.
                if let Some(oldest) = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.inserted_at)
                    .map(|(path, _)| path.clone())
                {
                    slots.remove(&oldest);
                }
            }
        }
        slots.insert(
            path.clone(),
            CacheSlot {
                entries,
                inserted_at: Instant::now(),
            },
        );
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop the cached listing of `path` and of its parent directory.
    ///
    /// Called after a mutating operation: the file's own listing is stale
    /// and so is the listing it appears in.
    pub fn invalidate(&self, path: &LogicalPath) {
        let mut slots = self.slots.write();
        let mut dropped = 0u64;
        if slots.remove(path).is_some() {
            dropped += 1;
        }
        if let Some(parent) = path.parent() {
            if slots.remove(&parent).is_some() {
                dropped += 1;
            }
        }
        self.invalidations.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Drop every cached listing at or under `path`.
    pub fn invalidate_prefix(&self, path: &LogicalPath) {
        let prefix = if path.as_str() == "/" {
            "/".to_string()
        } else {
            format!("{}/", path.as_str())
        };
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|key, _| key != path && !key.as_str().starts_with(&prefix));
        self.invalidations
            .fetch_add((before - slots.len()) as u64, Ordering::Relaxed);
    }

    /// Drop everything.
    pub fn flush(&self) {
        let mut slots = self.slots.write();
        let dropped = slots.len() as u64;
        slots.clear();
        self.invalidations.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Number of cached listings, fresh or not.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether the cache holds no listings.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DirCacheStats {
        DirCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn sweep_locked(&self, slots: &mut HashMap<LogicalPath, CacheSlot>) {
        let before = slots.len();
        let ttl = self.config.ttl;
        slots.retain(|_, slot| slot.inserted_at.elapsed() <= ttl);
        self.expirations
            .fetch_add((before - slots.len()) as u64, Ordering::Relaxed);
    }
}

impl Default for DirCache {
    fn default() -> Self {
        DirCache::new(DirCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(path: &str) -> LogicalPath {
        LogicalPath::new(path).unwrap()
    }

    fn listing() -> Vec<DirectoryEntry> {
        vec![
            DirectoryEntry::file("run1.gz", 42),
            DirectoryEntry::directory("sub"),
        ]
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = DirCache::default();
        cache.insert(&p("/data"), listing());
        assert_eq!(cache.get(&p("/data")).unwrap().len(), 2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.inserts, 1);
    }

    #[test]
    fn test_expired_entry_misses() {
        let cache = DirCache::new(DirCacheConfig {
            ttl: Duration::from_millis(0),
            ..Default::default()
        });
        cache.insert(&p("/data"), listing());
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get(&p("/data")).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_disabled_cache_never_stores() {
        let cache = DirCache::new(DirCacheConfig {
            enabled: false,
            ..Default::default()
        });
        cache.insert(&p("/data"), listing());
        assert!(cache.is_empty());
        assert!(cache.get(&p("/data")).is_none());
    }

    #[test]
    fn test_invalidate_drops_path_and_parent() {
        let cache = DirCache::default();
        cache.insert(&p("/data"), listing());
        cache.insert(&p("/data/sub"), listing());
        cache.insert(&p("/other"), listing());

        cache.invalidate(&p("/data/sub"));
        assert!(cache.get(&p("/data/sub")).is_none());
        assert!(cache.get(&p("/data")).is_none());
        assert!(cache.get(&p("/other")).is_some());
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = DirCache::default();
        cache.insert(&p("/data"), listing());
        cache.insert(&p("/data/sub"), listing());
        cache.insert(&p("/database"), listing());

        cache.invalidate_prefix(&p("/data"));
        assert!(cache.get(&p("/data")).is_none());
        assert!(cache.get(&p("/data/sub")).is_none());
        // Sibling with a shared string prefix survives.
        assert!(cache.get(&p("/database")).is_some());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = DirCache::new(DirCacheConfig {
            max_entries: 2,
            ..Default::default()
        });
        cache.insert(&p("/a"), listing());
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(&p("/b"), listing());
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(&p("/c"), listing());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&p("/a")).is_none());
        assert!(cache.get(&p("/c")).is_some());
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        use std::sync::Arc;
        let cache = Arc::new(DirCache::default());
        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                let path = p(&format!("/dir{}", i % 4));
                for _ in 0..100 {
                    cache.insert(&path, listing());
                    let _ = cache.get(&path);
                    cache.invalidate(&path);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
