//! Exponential backoff retry with jitter and explicit attempt outcomes.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::TranslateError;

/// Configuration for a retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one. Clamped to 1.
    pub max_attempts: u32,
    /// Base backoff delay before the second attempt.
    pub base_delay: Duration,
    /// Maximum backoff delay (caps exponential growth and jitter).
    pub max_delay: Duration,
    /// Perturb each delay by a factor of `1 + U(-jitter, jitter)`.
    /// Clamped to `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    /// Transport-level defaults.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Batch-level defaults: decode/validation failures are usually fixed by
    /// a prompt re-roll, so the budget is short.
    pub fn batch_defaults() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(3),
            jitter: 0.2,
        }
    }
}

/// Compute the backoff delay before retrying after `attempt` (1-based):
/// `min(max_delay, base * 2^(attempt-1))`, perturbed by the jitter factor
/// and clamped to `[0, max_delay]`.
pub fn compute_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let attempt = attempt.max(1);
    let base = if config.base_delay.is_zero() {
        Duration::from_millis(500)
    } else {
        config.base_delay
    };
    let max = if config.max_delay.is_zero() {
        Duration::from_secs(10)
    } else {
        config.max_delay
    };
    let jitter = config.jitter.clamp(0.0, 1.0);

    let exp = base.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
    let mut delay = exp.min(max.as_secs_f64());

    if jitter > 0.0 {
        let j = (rand::thread_rng().gen::<f64>() * 2.0 - 1.0) * jitter;
        delay = (delay * (1.0 + j)).clamp(0.0, max.as_secs_f64());
    }
    Duration::from_secs_f64(delay)
}

/// Result of one attempt of a retryable unit of work.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The attempt succeeded; stop retrying.
    Success(T),
    /// The attempt failed transiently. `delay`, when set, overrides the
    /// computed backoff (e.g. a server-supplied `Retry-After`); zero means
    /// an immediate retry.
    Retryable {
        error: TranslateError,
        delay: Option<Duration>,
    },
    /// The attempt failed terminally; stop retrying.
    Fatal(TranslateError),
}

/// Run `op` up to `config.max_attempts` times, sleeping between attempts.
///
/// Cancellation aborts immediately between attempts and during backoff
/// sleep. Exhausting the budget returns the last error.
pub async fn run_with_retry<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, TranslateError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(TranslateError::Canceled);
        }

        match op(attempt).await {
            Outcome::Success(value) => return Ok(value),
            Outcome::Fatal(error) => return Err(error),
            Outcome::Retryable { error, delay } => {
                if attempt == max_attempts {
                    return Err(error);
                }
                let delay = delay.unwrap_or_else(|| compute_backoff(attempt, config));
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "sleeping before retrying request"
                );
                last_err = Some(error);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TranslateError::Canceled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| TranslateError::Http("request failed".into())))
}
