//! Bounded Retry Driver
//!
//! Generic retry-with-bail mechanism, decoupled from classification policy:
//! each attempt reports an explicit [`CallOutcome`] and the driver decides
//! whether to sleep and go again. Delays grow exponentially
//! (`min_timeout * factor^attempt`) with optional jitter, and every sleep is
//! cancellable.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::classifier::ClassifiedError;

/// Retry configuration for remote calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub min_timeout: Duration,
    /// Multiplier applied to the delay each attempt.
    pub factor: f64,
    /// Jitter as a fraction of the delay (0.0 disables jitter).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_timeout: Duration::from_millis(500),
            factor: 1.2,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let base_ms = self.min_timeout.as_millis() as f64 * self.factor.powi(attempt as i32);
        let jittered = apply_jitter(base_ms, self.jitter_factor);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

fn apply_jitter(base_ms: f64, jitter_factor: f64) -> f64 {
    if jitter_factor <= 0.0 {
        return base_ms;
    }
    let jitter_range = base_ms * jitter_factor;
    let mut rng = rand::rng();
    base_ms + rng.random_range(-jitter_range..=jitter_range)
}

/// Result of a single call attempt.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// The call succeeded.
    Ok(T),
    /// The call failed but may be retried.
    Retryable(ClassifiedError),
    /// The call failed and must not be retried.
    Fatal(ClassifiedError),
}

/// Run `op` with bounded retry.
///
/// `Fatal` outcomes abort immediately with that error. `Retryable` outcomes
/// sleep `min_timeout * factor^attempt` and try again, up to
/// `policy.max_attempts` attempts in total; the last classified error is
/// returned on exhaustion. Cancellation during a backoff sleep also returns
/// the last error, so teardown never waits out a pending retry.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CallOutcome<T>>,
{
    let attempts = policy.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        match op().await {
            CallOutcome::Ok(value) => return Ok(value),
            CallOutcome::Fatal(error) => return Err(error),
            CallOutcome::Retryable(error) => {
                attempt += 1;
                if attempt >= attempts {
                    return Err(error);
                }

                let delay = policy.delay_for(attempt - 1);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying after backoff"
                );

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => {
                        tracing::debug!("retry cancelled during backoff");
                        return Err(error);
                    }
                }
            }
        }
    }
}
