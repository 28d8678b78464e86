//! Retry policy for control-plane calls.
//!
//! Retryable failures are retried up to `max_attempts` total with an
//! exponential wait between attempts:
//!
//! ```text
//! wait(attempt) = clamp(multiplier * 2^(attempt - 1), min_wait, max_wait)
//! ```
//!
//! With the defaults (3 attempts, 1s multiplier, 2s..10s) the waits are
//! 2s and 2s. Anything the predicate does not classify as retryable is
//! returned on the spot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fleetroll_core::{ControlPlaneError, TimingConfig};
use tracing::{debug, warn};

use crate::sleep::{Sleeper, TokioSleeper};

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ControlPlaneError {
    fn is_retryable(&self) -> bool {
        ControlPlaneError::is_retryable(self)
    }
}

/// Attempt count and backoff bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            min_wait: Duration::from_secs(2),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl From<&TimingConfig> for RetryConfig {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            max_attempts: timing.retry_attempts.max(1),
            multiplier: Duration::from_secs(timing.retry_multiplier_secs),
            min_wait: Duration::from_secs(timing.retry_min_wait_secs),
            max_wait: Duration::from_secs(timing.retry_max_wait_secs),
        }
    }
}

impl RetryConfig {
    /// Wait after the given (1-based) attempt failed.
    pub fn wait_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let raw = self.multiplier.checked_mul(factor).unwrap_or(self.max_wait);
        raw.max(self.min_wait).min(self.max_wait)
    }
}

/// Stateless retry wrapper, reusable across calls.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default(), Arc::new(TokioSleeper))
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { config, sleeper }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Run `call`, retrying errors that report themselves as retryable.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, call: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with(operation, E::is_retryable, call).await
    }

    /// Run `call`, retrying the errors `is_retryable` accepts.
    ///
    /// Returns the last error once attempts are exhausted.
    pub async fn run_with<T, E, P, F, Fut>(
        &self,
        operation: &str,
        is_retryable: P,
        mut call: F,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            debug!(%operation, attempt, max_attempts, "calling control plane");

            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_retryable(&err) {
                warn!(%operation, attempt, error = %err, "non-retryable failure");
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!(%operation, attempt, error = %err, "retries exhausted");
                return Err(err);
            }

            let wait = self.config.wait_after(attempt);
            warn!(
                %operation,
                attempt,
                wait_secs = wait.as_secs_f64(),
                error = %err,
                "transient failure, retrying"
            );
            self.sleeper.sleep(wait).await;
            attempt += 1;
        }
    }
}
