//! Engine-level errors.
//!
//! Storage and catalog failures pass through transparently; the variants
//! here are the decisions only the engine can make (last-replica
//! protection, catalog inconsistency after a successful physical action,
//! request validation).

use thiserror::Error;

use gridrep_catalog::CatalogError;
use gridrep_storage::StorageError;

/// Errors from request validation and per-file operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request itself is unusable; reported before any per-file work.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What is wrong with the request or configuration.
        reason: String,
    },

    /// The file has no usable replica to act on.
    #[error("no usable replica of {path}")]
    NoReplica {
        /// The logical file.
        path: String,
    },

    /// The logical destination already exists in the catalog.
    #[error("destination already exists: {path}")]
    AlreadyExists {
        /// The logical path that is already taken.
        path: String,
    },

    /// Refused to delete the sole remaining replica without force.
    #[error("refusing to remove the last replica of {path} at {se}")]
    LastReplicaProtected {
        /// The logical file.
        path: String,
        /// The element holding the last replica.
        se: String,
    },

    /// The physical action succeeded but the catalog update failed.
    ///
    /// Never retried automatically: retrying would repeat the physical
    /// action.
    #[error("catalog update failed after {action} of {path}: {detail}")]
    CatalogInconsistent {
        /// The physical action that did succeed.
        action: String,
        /// The logical file.
        path: String,
        /// The catalog failure.
        detail: String,
    },

    /// The request was cancelled before this file started.
    #[error("operation cancelled")]
    Cancelled,

    /// Failure in the storage layer.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Failure in the catalog layer.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl EngineError {
    /// Whether the per-file operation should be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Storage(e) => e.is_transient(),
            EngineError::Catalog(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification_delegates() {
        assert!(EngineError::Storage(StorageError::BackendUnavailable {
            reason: "reset".into()
        })
        .is_transient());
        assert!(EngineError::Catalog(CatalogError::Unavailable {
            reason: "lfc down".into()
        })
        .is_transient());
        assert!(!EngineError::LastReplicaProtected {
            path: "/data/x".into(),
            se: "RAL-disk".into()
        }
        .is_transient());
        assert!(!EngineError::CatalogInconsistent {
            action: "replicate".into(),
            path: "/data/x".into(),
            detail: "lfc write failed".into()
        }
        .is_transient());
        assert!(!EngineError::Configuration {
            reason: "bad regex".into()
        }
        .is_transient());
    }
}
