//! Error taxonomy shared by the storage layer and its callers.
//!
//! Backend adapters translate middleware failures into these variants;
//! raw exit codes and stderr text never leak past the adapter boundary.
//! `is_transient` drives the retry policy: only transient variants are
//! worth another attempt, everything else fails the file immediately.

use thiserror::Error;

/// Errors produced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A logical path was not absolute or otherwise malformed.
    #[error("invalid logical path: {path}")]
    InvalidPath {
        /// The offending path string.
        path: String,
    },

    /// A physical URL's host matched no registered storage element.
    #[error("no storage element recognises host of {url}")]
    HostNotRecognized {
        /// The URL that could not be resolved.
        url: String,
    },

    /// A physical URL's host matched more than one storage element.
    #[error("url {url} matches multiple storage elements: {}", matched.join(", "))]
    AmbiguousUrl {
        /// The URL that resolved ambiguously.
        url: String,
        /// Names of all elements that matched at equal specificity.
        matched: Vec<String>,
    },

    /// A storage element name is not present in the registry.
    #[error("unknown storage element: {name}")]
    UnknownElement {
        /// The requested element name.
        name: String,
    },

    /// Two registry entries share the same name.
    #[error("duplicate storage element in configuration: {name}")]
    DuplicateElement {
        /// The duplicated element name.
        name: String,
    },

    /// The remote file, directory or replica does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Path or URL that was missing.
        what: String,
    },

    /// The middleware refused the operation for credential reasons.
    #[error("access denied: {what}")]
    AccessDenied {
        /// Path or URL the operation targeted.
        what: String,
    },

    /// Transient backend or network failure; retried per policy.
    #[error("backend unavailable: {reason}")]
    BackendUnavailable {
        /// Short description of the failure.
        reason: String,
    },

    /// A middleware command failed in a way no pattern recognised.
    #[error("{program} failed: {detail}")]
    CommandFailed {
        /// The command that was invoked.
        program: String,
        /// Classified detail, taken from stderr (or stdout when empty).
        detail: String,
    },

    /// A tape bring-online request did not reach READY in time.
    #[error("stage of {url} timed out after {waited_ms}ms")]
    StageTimeout {
        /// URL being staged.
        url: String,
        /// Total time waited before giving up.
        waited_ms: u64,
    },

    /// A tape bring-online request was rejected by the backend.
    #[error("stage of {url} failed: {reason}")]
    StageFailed {
        /// URL being staged.
        url: String,
        /// Backend-reported reason.
        reason: String,
    },

    /// Transferred data does not match the catalog checksum.
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Checksum recorded in the catalog.
        expected: String,
        /// Checksum computed for the transferred copy.
        computed: String,
    },

    /// The backend could not report a checksum for the replica.
    #[error("checksum unavailable for {url}")]
    ChecksumUnavailable {
        /// URL whose checksum was requested.
        url: String,
    },

    /// A local destination file already exists and force was not given.
    #[error("local file already exists: {path}")]
    LocalFileExists {
        /// The local path that would have been overwritten.
        path: String,
    },

    /// Local filesystem I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this failure is worth retrying.
    ///
    /// Transient: backend/network hiccups and unclassified command
    /// failures. Permanent: resolution errors, missing files, credential
    /// problems, checksum mismatches and stage timeouts (a timeout has
    /// already consumed its own retry window).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::BackendUnavailable { .. }
                | StorageError::CommandFailed { .. }
                | StorageError::Io(_)
        )
    }
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::BackendUnavailable {
            reason: "connection reset".into()
        }
        .is_transient());
        assert!(StorageError::CommandFailed {
            program: "gfal-ls".into(),
            detail: "???".into()
        }
        .is_transient());
        assert!(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "eof"
        ))
        .is_transient());

        assert!(!StorageError::NotFound {
            what: "/data/x".into()
        }
        .is_transient());
        assert!(!StorageError::AccessDenied {
            what: "/data/x".into()
        }
        .is_transient());
        assert!(!StorageError::ChecksumMismatch {
            expected: "aabbccdd".into(),
            computed: "00112233".into()
        }
        .is_transient());
        assert!(!StorageError::StageTimeout {
            url: "srm://se/x".into(),
            waited_ms: 1000
        }
        .is_transient());
        assert!(!StorageError::HostNotRecognized {
            url: "srm://nowhere/x".into()
        }
        .is_transient());
    }

    #[test]
    fn test_display() {
        let err = StorageError::AmbiguousUrl {
            url: "root://host/x".into(),
            matched: vec!["se-a".into(), "se-b".into()],
        };
        assert_eq!(
            format!("{}", err),
            "url root://host/x matches multiple storage elements: se-a, se-b"
        );

        let err = StorageError::StageTimeout {
            url: "srm://se/x".into(),
            waited_ms: 250,
        };
        assert_eq!(format!("{}", err), "stage of srm://se/x timed out after 250ms");
    }
}
