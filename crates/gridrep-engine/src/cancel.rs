//! Cooperative cancellation for bulk requests.
//!
//! The engine checks the token between per-file submissions: cancellation
//! stops new work immediately, lets in-flight operations finish or time
//! out, and the partial aggregate is still returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Why a request was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelReason {
    /// Explicit user interrupt (Ctrl-C).
    #[default]
    UserRequested,
    /// The process is shutting down.
    Shutdown,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::UserRequested => f.write_str("user requested"),
            CancelReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Cloneable token observed by the engine.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl CancelToken {
    /// A token that can never be cancelled.
    pub fn never() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The reason, once cancelled.
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.lock().ok().and_then(|slot| *slot)
    }
}

/// The handle that triggers cancellation.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<CancelReason>>>,
}

impl CancelHandle {
    /// Trigger cancellation. The first reason wins.
    pub fn cancel(&self, reason: CancelReason) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.reason.lock() {
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
    }
}

/// Create a token/handle pair.
pub fn cancel_pair() -> (CancelToken, CancelHandle) {
    let cancelled = Arc::new(AtomicBool::new(false));
    let reason = Arc::new(Mutex::new(None));
    (
        CancelToken {
            cancelled: cancelled.clone(),
            reason: reason.clone(),
        },
        CancelHandle { cancelled, reason },
    )
}
