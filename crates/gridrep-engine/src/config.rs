//! Process configuration: the storage element registry snapshot plus
//! engine tuning, loaded once at startup.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gridrep_catalog::DirCacheConfig;
use gridrep_storage::stage::StageConfig;
use gridrep_storage::{SeRegistry, StorageElement};

use crate::engine::EngineConfig;
use crate::error::{EngineError, Result};
use crate::retry::RetryConfig;

/// On-disk configuration for the whole process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Namespace root under which the catalog lives on every element.
    pub basedir: String,
    /// Catalog prefix for logical URLs.
    pub catalog_prefix: String,
    /// Concurrent per-file operations.
    pub max_workers: usize,
    /// Attempts per file before a transient failure is final.
    pub retry_attempts: u32,
    /// Overall tape bring-online deadline, seconds.
    pub stage_timeout_secs: u64,
    /// Directory listing cache lifetime, seconds.
    pub cache_ttl_secs: u64,
    /// The storage element registry snapshot.
    pub storage_elements: Vec<StorageElement>,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            basedir: "/exp.org".to_string(),
            catalog_prefix: "lfn:/grid".to_string(),
            max_workers: 4,
            retry_attempts: 3,
            stage_timeout_secs: 6 * 60 * 60,
            cache_ttl_secs: 60,
            storage_elements: Vec::new(),
        }
    }
}

impl GridConfig {
    /// Load from a TOML or JSON file, decided by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(&contents)?),
            "json" => Ok(serde_json::from_str(&contents)?),
            _ => anyhow::bail!("unsupported config file extension: {}", ext),
        }
    }

    /// Build the immutable registry snapshot.
    pub fn build_registry(&self) -> Result<Arc<SeRegistry>> {
        let registry = SeRegistry::new(self.basedir.clone(), self.storage_elements.clone())
            .map_err(|e| EngineError::Configuration {
                reason: e.to_string(),
            })?;
        Ok(Arc::new(registry))
    }

    /// Engine tuning derived from the file.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_workers: self.max_workers.max(1),
            retry: RetryConfig {
                max_attempts: self.retry_attempts.max(1),
                ..RetryConfig::default()
            },
            stage: StageConfig {
                timeout: Duration::from_secs(self.stage_timeout_secs),
                ..StageConfig::default()
            },
        }
    }

    /// Listing cache configuration derived from the file.
    pub fn cache_config(&self) -> DirCacheConfig {
        DirCacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            ..DirCacheConfig::default()
        }
    }
}
