//! Bounded retry with exponential backoff for calls to the authority.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use super::collaborators::CollaboratorError;
use crate::core::ComprobanteError;
use crate::core::error::Result;

/// Retry behavior for transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries, not counting the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Factor applied to the delay after each retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn no_retry() -> Self {
        Self::with_max_retries(0)
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff = self.initial_backoff.as_millis() as f64
            * self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;
        Duration::from_millis(backoff_ms)
    }
}

/// How long and how often to poll for an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Overall budget; when exceeded the answer is still pending.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Run a remote call, retrying failures with exponential backoff.
///
/// Every collaborator error is treated as transport-level; business
/// answers arrive as `Ok` and are never retried. After the last attempt the
/// failure surfaces as [`ComprobanteError::Transport`].
pub async fn retry_transport<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, CollaboratorError>>,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        operation,
                        attempt = attempt + 1,
                        "authority call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= policy.max_retries {
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        error = %err,
                        "authority call failed after max retries"
                    );
                    return Err(ComprobanteError::Transport(format!(
                        "{operation} failed after {} attempt(s): {err}",
                        attempt + 1
                    )));
                }

                let backoff = policy.backoff_duration(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "authority call failed, retrying after backoff"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
