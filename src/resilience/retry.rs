use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::ResilienceConfig;
use crate::error::{ResilienceError, WardenError};

/// Backoff schedule for [`with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            multiplier: config.retry_backoff_multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }
}

/// Re-run `op` until it succeeds, the error is not retryable, or the attempt
/// budget is spent.
///
/// `is_retryable` is the allow-set: errors it rejects are returned to the
/// caller on the first occurrence without further attempts. Exhausting the
/// budget yields [`ResilienceError::RetriesExhausted`] carrying the last
/// error text.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: impl Fn(&anyhow::Error) -> bool,
    mut op: F,
) -> Result<T, WardenError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => return Err(err.into()),
            Err(err) => {
                if attempt == attempts {
                    warn!(call = label, attempts, error = %err, "retry budget exhausted");
                    return Err(ResilienceError::RetriesExhausted {
                        attempts,
                        message: err.to_string(),
                    }
                    .into());
                }
                warn!(
                    call = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.multiplier);
            }
        }
    }
    unreachable!("loop returns on the final attempt")
}
