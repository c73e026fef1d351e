//! Bulk operation requests and their aggregate reports.

use std::path::PathBuf;

use serde::Serialize;

use gridrep_catalog::CatalogError;
use gridrep_storage::{LogicalPath, StorageError};

use crate::error::EngineError;

/// The bulk action to perform over the resolved file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Download files to a local destination.
    Get,
    /// Upload a local file and register it.
    Put,
    /// Copy files to a target element and register the new replicas.
    Replicate,
    /// Report replica presence; never mutates anything.
    Check,
    /// Delete replicas at a target element and deregister them.
    Remove,
    /// Drop stale replica records and restore lost copies.
    Repair,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Get => f.write_str("get"),
            Action::Put => f.write_str("put"),
            Action::Replicate => f.write_str("replicate"),
            Action::Check => f.write_str("check"),
            Action::Remove => f.write_str("remove"),
            Action::Repair => f.write_str("repair"),
        }
    }
}

/// One submitted bulk request. Immutable once built.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// What to do.
    pub action: Action,
    /// Logical root: a file, or a directory to expand.
    pub root: LogicalPath,
    /// Optional regex applied to file base names during expansion.
    pub filter: Option<String>,
    /// Target element for replicate/check/remove, preferred source for
    /// get, destination for put.
    pub target_se: Option<String>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Override safety refusals (last-replica removal, local overwrite).
    pub force: bool,
    /// Local destination (get) or source (put).
    pub local: Option<PathBuf>,
}

impl OperationRequest {
    /// A request with everything optional switched off.
    pub fn new(action: Action, root: LogicalPath) -> Self {
        OperationRequest {
            action,
            root,
            filter: None,
            target_se: None,
            recursive: false,
            force: false,
            local: None,
        }
    }

    /// Set the base-name regex filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the target storage element.
    pub fn with_target(mut self, se: impl Into<String>) -> Self {
        self.target_se = Some(se.into());
        self
    }

    /// Expand directories recursively.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Set the force flag.
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Set the local path.
    pub fn with_local(mut self, local: impl Into<PathBuf>) -> Self {
        self.local = Some(local.into());
        self
    }
}

/// Per-file outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    /// The action completed.
    Success,
    /// Nothing to do for this file.
    Skipped,
    /// The physical action completed but left a reportable inconsistency.
    Warning,
    /// The action failed.
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => f.write_str("SUCCESS"),
            Outcome::Skipped => f.write_str("SKIPPED"),
            Outcome::Warning => f.write_str("WARNING"),
            Outcome::Failed => f.write_str("FAILED"),
        }
    }
}

/// Classified failure reason carried in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailReason {
    /// A replica URL matched no registered element.
    HostNotRecognized,
    /// Retries exhausted against a flaky backend.
    BackendUnavailable,
    /// Tape bring-online missed its deadline.
    StageTimeout,
    /// Transferred data failed verification.
    ChecksumMismatch,
    /// Physical action done, catalog update failed.
    CatalogInconsistent,
    /// Sole remaining replica and no force flag.
    LastReplicaProtected,
    /// The file has no usable replica.
    NoReplica,
    /// File, directory or replica missing.
    NotFound,
    /// Credential problem.
    AccessDenied,
    /// Logical destination already exists.
    AlreadyExists,
    /// Request-level validation failure.
    Configuration,
    /// The request was cancelled.
    Cancelled,
    /// Anything the taxonomy does not name.
    Other,
}

impl FailReason {
    /// Classify an engine error for the report.
    pub fn classify(err: &EngineError) -> FailReason {
        match err {
            EngineError::Configuration { .. } => FailReason::Configuration,
            EngineError::NoReplica { .. } => FailReason::NoReplica,
            EngineError::AlreadyExists { .. } => FailReason::AlreadyExists,
            EngineError::LastReplicaProtected { .. } => FailReason::LastReplicaProtected,
            EngineError::CatalogInconsistent { .. } => FailReason::CatalogInconsistent,
            EngineError::Cancelled => FailReason::Cancelled,
            EngineError::Storage(e) => FailReason::classify_storage(e),
            EngineError::Catalog(e) => match e {
                CatalogError::NotFound { .. } => FailReason::NotFound,
                CatalogError::Unavailable { .. } => FailReason::BackendUnavailable,
                CatalogError::Storage(inner) => FailReason::classify_storage(inner),
                CatalogError::Parse { .. } => FailReason::Other,
            },
        }
    }

    fn classify_storage(e: &StorageError) -> FailReason {
        match e {
            StorageError::HostNotRecognized { .. } | StorageError::AmbiguousUrl { .. } => {
                FailReason::HostNotRecognized
            }
            StorageError::BackendUnavailable { .. }
            | StorageError::CommandFailed { .. }
            | StorageError::Io(_) => FailReason::BackendUnavailable,
            StorageError::StageTimeout { .. } | StorageError::StageFailed { .. } => {
                FailReason::StageTimeout
            }
            StorageError::ChecksumMismatch { .. } => FailReason::ChecksumMismatch,
            StorageError::NotFound { .. } => FailReason::NotFound,
            StorageError::AccessDenied { .. } => FailReason::AccessDenied,
            StorageError::UnknownElement { .. } | StorageError::DuplicateElement { .. } => {
                FailReason::Configuration
            }
            _ => FailReason::Other,
        }
    }
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailReason::HostNotRecognized => "host-not-recognized",
            FailReason::BackendUnavailable => "backend-unavailable",
            FailReason::StageTimeout => "stage-timeout",
            FailReason::ChecksumMismatch => "checksum-mismatch",
            FailReason::CatalogInconsistent => "catalog-inconsistent",
            FailReason::LastReplicaProtected => "last-replica-protected",
            FailReason::NoReplica => "no-replica",
            FailReason::NotFound => "not-found",
            FailReason::AccessDenied => "access-denied",
            FailReason::AlreadyExists => "already-exists",
            FailReason::Configuration => "configuration",
            FailReason::Cancelled => "cancelled",
            FailReason::Other => "error",
        };
        f.write_str(label)
    }
}

/// The per-file outcome record.
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// The logical file.
    pub path: LogicalPath,
    /// The element involved, when one was.
    pub se: Option<String>,
    /// Outcome classification.
    pub outcome: Outcome,
    /// Failure/warning reason, absent on plain success.
    pub reason: Option<FailReason>,
    /// Human-readable detail.
    pub message: Option<String>,
}

impl OperationResult {
    /// A plain success.
    pub fn success(path: LogicalPath, se: Option<String>) -> Self {
        OperationResult {
            path,
            se,
            outcome: Outcome::Success,
            reason: None,
            message: None,
        }
    }

    /// A skip with an explanation.
    pub fn skipped(path: LogicalPath, se: Option<String>, message: impl Into<String>) -> Self {
        OperationResult {
            path,
            se,
            outcome: Outcome::Skipped,
            reason: None,
            message: Some(message.into()),
        }
    }

    /// A warning; used only for catalog inconsistency after a successful
    /// physical action.
    pub fn warning(path: LogicalPath, se: Option<String>, message: impl Into<String>) -> Self {
        OperationResult {
            path,
            se,
            outcome: Outcome::Warning,
            reason: Some(FailReason::CatalogInconsistent),
            message: Some(message.into()),
        }
    }

    /// A failure classified from the final error.
    pub fn failed(path: LogicalPath, se: Option<String>, err: &EngineError) -> Self {
        OperationResult {
            path,
            se,
            outcome: Outcome::Failed,
            reason: Some(FailReason::classify(err)),
            message: Some(err.to_string()),
        }
    }

    /// Attach a message to a result.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Aggregate of one bulk request, in resolution order.
#[derive(Debug)]
pub struct OperationReport {
    /// The action that was run.
    pub action: Action,
    /// Per-file outcomes, ordered as the walker yielded the files.
    pub results: Vec<OperationResult>,
    /// Whether submission stopped early on cancellation.
    pub cancelled: bool,
}

impl OperationReport {
    /// An empty report for `action`.
    pub fn new(action: Action) -> Self {
        OperationReport {
            action,
            results: Vec::new(),
            cancelled: false,
        }
    }

    /// Count results with the given outcome.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Overall success: no FAILED entry.
    pub fn ok(&self) -> bool {
        self.count(Outcome::Failed) == 0
    }

    /// Process exit code consumed by the CLI: non-zero iff any FAILED.
    pub fn exit_code(&self) -> i32 {
        if self.ok() {
            0
        } else {
            1
        }
    }

    /// One-line summary of the aggregate.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} succeeded, {} skipped, {} warnings, {} failed",
            self.action,
            self.count(Outcome::Success),
            self.count(Outcome::Skipped),
            self.count(Outcome::Warning),
            self.count(Outcome::Failed),
        )
    }
}
