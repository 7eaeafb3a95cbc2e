use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::WorkflowError;
use crate::core::activity::ActivityError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    /// Attempts including the first one. 0 retries forever.
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,
    #[serde(default = "default_maximum_interval_ms")]
    pub maximum_interval_ms: u64,
}

fn default_maximum_attempts() -> u32 {
    5
}
fn default_initial_interval_ms() -> u64 {
    1_000
}
fn default_backoff_coefficient() -> f64 {
    2.0
}
fn default_maximum_interval_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: default_maximum_attempts(),
            initial_interval_ms: default_initial_interval_ms(),
            backoff_coefficient: default_backoff_coefficient(),
            maximum_interval_ms: default_maximum_interval_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let coefficient = self.backoff_coefficient.max(1.0);
        let delay_ms = (self.initial_interval_ms as f64) * coefficient.powi(exponent);
        let capped = delay_ms.min(self.maximum_interval_ms as f64);
        Duration::from_millis(capped as u64)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.maximum_attempts != 0 && attempt >= self.maximum_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityOptions {
    #[serde(default = "default_start_to_close_secs")]
    pub start_to_close_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_start_to_close_secs() -> u64 {
    120
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout_secs: default_start_to_close_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ActivityOptions {
    pub fn start_to_close_timeout(&self) -> Duration {
        Duration::from_secs(self.start_to_close_timeout_secs)
    }
}

/// Run one activity under the timeout and retry policy.
///
/// `attempt` builds a fresh future per try and receives the 1-based attempt
/// number. A timed-out or canceled attempt is dropped, which tears down any
/// container it had launched.
pub async fn execute_activity<T, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, WorkflowError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let timeout = options.start_to_close_timeout();
    let policy = &options.retry;
    let mut n: u32 = 1;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkflowError::Canceled),
            res = tokio::time::timeout(timeout, attempt(n)) => res,
        };

        let timed_out = match outcome {
            Ok(Ok(value)) => {
                if n > 1 {
                    info!("Activity {} succeeded on attempt {}", name, n);
                }
                return Ok(value);
            }
            Ok(Err(e)) if !e.is_retryable() => {
                warn!("Activity {} failed permanently: {}", name, e);
                return Err(WorkflowError::NonRetryable {
                    activity: name.to_string(),
                    message: e.to_string(),
                });
            }
            Ok(Err(e)) => {
                if policy.exhausted(n) {
                    return Err(WorkflowError::RetriesExhausted {
                        activity: name.to_string(),
                        attempts: n,
                        message: e.to_string(),
                    });
                }
                warn!("Activity {} attempt {} failed: {}", name, n, e);
                false
            }
            Err(_) => {
                if policy.exhausted(n) {
                    return Err(WorkflowError::Timeout {
                        activity: name.to_string(),
                        attempts: n,
                    });
                }
                warn!(
                    "Activity {} attempt {} timed out after {:?}",
                    name, n, timeout
                );
                true
            }
        };

        let delay = policy.backoff(n);
        info!(
            "Retrying activity {} in {:?} (attempt {}{})",
            name,
            delay,
            n + 1,
            if timed_out { ", after timeout" } else { "" }
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(WorkflowError::Canceled),
            _ = tokio::time::sleep(delay) => {}
        }
        n += 1;
    }
}
