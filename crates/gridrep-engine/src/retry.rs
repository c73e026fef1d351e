//! Retry with exponential backoff for per-file operations.
//!
//! Only transient failures are retried; permanent ones (not-found,
//! checksum mismatch, credential problems, validation) fail the file on
//! the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Backoff before the second attempt (default: 500ms).
    pub initial_backoff: Duration,
    /// Cap for the doubling backoff (default: 30s).
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Executor applying the retry policy to async operations.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// New executor with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        RetryExecutor { config }
    }

    /// Run `operation`, retrying transient failures with backoff.
    ///
    /// Returns the first success, the first permanent error, or the last
    /// transient error once attempts are exhausted.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        RetryExecutor::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use gridrep_storage::StorageError;

    fn transient() -> EngineError {
        EngineError::Storage(StorageError::BackendUnavailable {
            reason: "reset".into(),
        })
    }

    fn permanent() -> EngineError {
        EngineError::Storage(StorageError::NotFound {
            what: "/data/x".into(),
        })
    }

    fn fast() -> RetryExecutor {
        RetryExecutor::new(RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        })
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let out = fast()
            .execute(move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, EngineError>(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_retried_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let out = fast()
            .execute(move || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let err = fast()
            .execute(move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(transient())
                }
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let err = fast()
            .execute(move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(permanent())
                }
            })
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
