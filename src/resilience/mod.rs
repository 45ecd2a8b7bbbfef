//! Fail-fast and retry machinery wrapped around unreliable dependencies.
//!
//! Three independent guards, composed by callers as needed:
//! - [`CircuitBreaker`] fails fast once a dependency has failed repeatedly.
//! - [`with_retry`] re-attempts transient failures with exponential backoff.
//! - [`RateLimiter`] throttles call volume with a continuously refilled
//!   token bucket.

mod breaker;
mod rate;
mod retry;

pub use breaker::{BreakerState, CircuitBreaker};
pub use rate::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
