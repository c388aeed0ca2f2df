//! Wait loop for asynchronous provider operations.
//!
//! Both provisioners hand a [`StatusSource`] to a [`Poller`], which refreshes
//! it at a fixed interval until it reaches a terminal state or the deadline
//! passes.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{ProvisionError, Result};

/// Status reported by a polled source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Accepted but not started.
    Pending,
    /// In progress.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error; carries the platform status.
    Failed(String),
    /// Not recognized; treated as still in progress.
    Unknown(String),
}

impl PollStatus {
    /// Returns true if the status will not change anymore.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

/// Something whose status can be refreshed.
#[async_trait]
pub trait StatusSource: Send {
    /// Fetches the current status.
    async fn fetch_status(&mut self) -> Result<PollStatus>;
}

/// Fixed-interval poller with a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    /// Sleep between fetches.
    interval: Duration,
    /// Total time allowed.
    timeout: Duration,
}

impl Poller {
    /// Creates a poller.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Poller for database operations: every 2s for up to 2 minutes.
    #[must_use]
    pub const fn neon_operations() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(120))
    }

    /// Poller for a cache service that was just created: every 5s for up to 15 minutes.
    #[must_use]
    pub const fn aiven_create() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(15 * 60))
    }

    /// Poller for an existing cache service: every 5s for up to 10 minutes.
    #[must_use]
    pub const fn aiven_existing() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(10 * 60))
    }

    /// Sleep between fetches.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Total time allowed.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Same poller with a different timeout.
    #[must_use]
    pub const fn with_timeout(self, timeout: Duration) -> Self {
        Self::new(self.interval, timeout)
    }

    /// Polls `source` until it succeeds, fails or the deadline passes.
    ///
    /// Returns the number of fetches performed.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::OperationFailed` on a failed status,
    /// `ProvisionError::Timeout` past the deadline, or the fetch error.
    pub async fn poll<S>(&self, source: &mut S, label: &str) -> Result<u32>
    where
        S: StatusSource + ?Sized,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            if start.elapsed() > self.timeout {
                return Err(ProvisionError::Timeout {
                    label: label.to_string(),
                    waited_secs: start.elapsed().as_secs(),
                }
                .into());
            }

            let status = source.fetch_status().await?;
            attempts = attempts.saturating_add(1);
            trace!("{label}: attempt {attempts} -> {status:?}");

            match status {
                PollStatus::Succeeded => {
                    debug!("{label} finished after {attempts} checks");
                    return Ok(attempts);
                }
                PollStatus::Failed(status) => {
                    return Err(ProvisionError::OperationFailed {
                        label: label.to_string(),
                        status,
                    }
                    .into());
                }
                PollStatus::Pending | PollStatus::Running | PollStatus::Unknown(_) => {
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }
}
