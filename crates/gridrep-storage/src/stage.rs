//! Poll-with-timeout loop for tape bring-online tickets.
//!
//! One poller services one ticket; concurrent stage waits multiplex on the
//! runtime rather than pinning threads. Backoff doubles up to a cap, and
//! the final sleep is clamped to the remaining window so the deadline is
//! honoured exactly.

use std::time::Duration;

use tokio::time::Instant;

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};
use crate::types::{PhysicalUrl, StageStatus};

/// Timing knobs for stage polling.
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// First poll interval.
    pub initial_interval: Duration,
    /// Cap for the doubling interval.
    pub max_interval: Duration,
    /// Overall deadline; past it the stage is `StageTimeout`.
    pub timeout: Duration,
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(300),
            timeout: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Waits for bring-online requests to reach READY.
#[derive(Debug, Clone)]
pub struct StagePoller {
    config: StageConfig,
}

impl StagePoller {
    /// New poller with the given timing configuration.
    pub fn new(config: StageConfig) -> Self {
        StagePoller { config }
    }

    /// Submit a bring-online request for `url` and wait until READY.
    ///
    /// Returns `StageTimeout` when the deadline passes, `StageFailed` when
    /// the backend rejects the request. Disk-family backends return READY
    /// on the first poll and never sleep.
    pub async fn wait_until_online(
        &self,
        backend: &dyn StorageBackend,
        url: &PhysicalUrl,
    ) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let ticket = backend.stage(url).await?;
        let mut interval = self.config.initial_interval;

        loop {
            match backend.stage_status(&ticket).await? {
                StageStatus::Ready => {
                    tracing::debug!(url = %url, elapsed = ?started.elapsed(), "replica online");
                    return Ok(());
                }
                StageStatus::Failed { reason } => {
                    return Err(StorageError::StageFailed {
                        url: url.as_str().to_string(),
                        reason,
                    });
                }
                StageStatus::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StorageError::StageTimeout {
                    url: url.as_str().to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            let sleep_for = interval.min(deadline - now);
            tracing::debug!(url = %url, wait = ?sleep_for, "replica still staging");
            tokio::time::sleep(sleep_for).await;
            interval = (interval * 2).min(self.config.max_interval);
        }
    }
}
