//! Bounded retry with exponential backoff for calls to external services.
//!
//! Every attempt is bounded by a timeout (an elapsed timeout counts as a
//! transient failure) and every wait can be interrupted by a
//! [`CancellationToken`]. Permanent failures are returned after the first
//! attempt.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Every attempt failed transiently.
    Exhausted { attempts: u32, last: ServiceError },
    Permanent(ServiceError),
    Cancelled,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Wait before retry number `retry` (1-based): base, 2*base, 4*base, ...
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (retry - 1).min(16);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        mut op: F,
    ) -> std::result::Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, ServiceError>>,
    {
        let mut last = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = self.delay_for(attempt - 1);
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                res = tokio::time::timeout(timeout, op()) => res,
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => ServiceError::Transient(format!("timed out after {:?}", timeout)),
            };

            if !err.is_transient() {
                tracing::debug!("{}: permanent failure: {}", label, err);
                return Err(RetryError::Permanent(err));
            }

            tracing::debug!(
                "{}: attempt {}/{} failed: {}",
                label,
                attempt,
                self.max_attempts,
                err
            );
            last = Some(err);
        }

        Err(RetryError::Exhausted {
            attempts: self.max_attempts,
            last: last.unwrap_or_else(|| ServiceError::Transient("no attempts made".to_string())),
        })
    }
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
            RetryError::Permanent(err) => write!(f, "{}", err),
            RetryError::Cancelled => write!(f, "cancelled"),
        }
    }
}
