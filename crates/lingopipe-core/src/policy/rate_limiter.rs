//! Token bucket rate limiter shared by dispatcher workers.
//!
//! The bucket holds at most one token and refills at `rps` tokens/second,
//! which spaces request starts `1/rps` apart regardless of how many workers
//! contend for it. A non-positive rate disables limiting entirely.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::TranslateError;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

struct TokenBucket {
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn new(refill_rate: f64) -> Self {
        Self {
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: 1.0,
                last_refill: Instant::now(),
            }),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated wait before one token is available.
    fn wait_time(&self) -> Duration {
        let state = self.state.lock().unwrap();
        let deficit = 1.0 - state.tokens;
        if deficit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(deficit / self.refill_rate)
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(1.0);
        state.last_refill = now;
    }
}

/// Request pacing for a translation job. One token is taken per batch
/// request, before its retry loop, so retry backoff is not double-paced.
pub struct RateLimiter {
    bucket: Option<TokenBucket>,
}

impl RateLimiter {
    /// `rps <= 0` disables pacing: `acquire` returns immediately.
    pub fn new(rps: f64) -> Self {
        Self {
            bucket: (rps > 0.0).then(|| TokenBucket::new(rps)),
        }
    }

    /// Wait until a token is available, or until the job is canceled.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), TranslateError> {
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };
        loop {
            if cancel.is_cancelled() {
                return Err(TranslateError::Canceled);
            }
            if bucket.try_acquire() {
                return Ok(());
            }
            let wait = bucket.wait_time().max(Duration::from_millis(1));
            tokio::select! {
                _ = cancel.cancelled() => return Err(TranslateError::Canceled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_limiter_never_waits() {
        let limiter = RateLimiter::new(0.0);
        let cancel = CancellationToken::new();
        let started = Instant::now();
        for _ in 0..100 {
            limiter.acquire(&cancel).await.unwrap();
        }
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::new(1.0);
        let cancel = CancellationToken::new();
        let started = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn second_acquire_waits_for_refill() {
        // 50 rps: second token available after ~20ms.
        let limiter = RateLimiter::new(50.0);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();
        let started = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn cancellation_aborts_wait() {
        // Effectively never refills.
        let limiter = RateLimiter::new(0.0001);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let result = limiter.acquire(&cancel).await;
        assert!(matches!(result, Err(TranslateError::Canceled)));
    }
}
