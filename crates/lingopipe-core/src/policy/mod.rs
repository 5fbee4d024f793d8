//! Policy engine — retry backoff and rate limiting.
//!
//! Two independently configured [`RetryConfig`] instances exist per job:
//! one drives request-level retry inside the transport, the other drives
//! batch-level retry (re-issuing a request whose response failed decode or
//! validation) inside the dispatcher.

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::RateLimiter;
pub use retry::{compute_backoff, run_with_retry, Outcome, RetryConfig};
