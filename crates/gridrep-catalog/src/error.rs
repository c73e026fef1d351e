//! Catalog-side error taxonomy.

use thiserror::Error;

use gridrep_storage::StorageError;

/// Errors from replica catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The logical path has no catalog entry.
    #[error("no catalog entry for {path}")]
    NotFound {
        /// The logical path that was looked up.
        path: String,
    },

    /// The catalog service could not be reached; transient.
    #[error("catalog unavailable: {reason}")]
    Unavailable {
        /// Short description of the failure.
        reason: String,
    },

    /// Catalog command output did not match the expected shape.
    #[error("unparseable catalog response: {detail}")]
    Parse {
        /// What the parser choked on.
        detail: String,
    },

    /// Failure below the catalog layer (command boundary, URL resolution).
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CatalogError {
    /// Whether this failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Unavailable { .. } => true,
            CatalogError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Convenience alias used throughout the catalog crate.
pub type Result<T> = std::result::Result<T, CatalogError>;
