use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ResilienceConfig;
use crate::error::{ResilienceError, WardenError};

/// Lifecycle of a breaker guarding one named dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures increment the counter.
    Closed,
    /// Calls fail immediately until the recovery window elapses.
    Open,
    /// Exactly one probe call is in flight.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Fail-fast guard around a single named dependency.
///
/// One instance per dependency, shared across callers. State transitions are
/// serialized behind the inner mutex so concurrent callers observe a
/// consistent failure count.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &ResilienceConfig) -> Self {
        Self::new(
            name,
            config.breaker_failure_threshold,
            Duration::from_secs(config.breaker_recovery_secs),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admission check before calling the dependency.
    ///
    /// `Closed` admits the call. `Open` rejects until the recovery window has
    /// elapsed, then admits one probe and moves to `HalfOpen`. While a probe
    /// is in flight, further calls are rejected.
    pub fn check(&self) -> Result<(), ResilienceError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Err(self.open_error(&inner)),
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(self.recovery, |at| at.elapsed());
                if elapsed >= self.recovery {
                    debug!(breaker = %self.name, "recovery window elapsed, admitting probe");
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(self.open_error(&inner))
                }
            }
        }
    }

    /// Record a successful dependency call. Resets the breaker to `Closed`.
    pub fn on_success(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.state != BreakerState::Closed {
            debug!(breaker = %self.name, "dependency recovered, closing breaker");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    /// Record a failed dependency call.
    ///
    /// A failed probe reopens immediately; in `Closed` the counter must reach
    /// the threshold first.
    pub fn on_failure(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        let should_open = inner.state == BreakerState::HalfOpen
            || inner.failure_count >= self.failure_threshold;
        if should_open && inner.state != BreakerState::Open {
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                "opening circuit"
            );
        }
        if should_open {
            inner.state = BreakerState::Open;
        }
    }

    /// Current state snapshot. Does not trigger the open-to-half-open
    /// transition; only `check` does that.
    pub fn state(&self) -> BreakerState {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .state
    }

    /// Run `fut` under the breaker, recording the outcome.
    pub async fn call<T, Fut>(&self, fut: Fut) -> Result<T, WardenError>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.check()?;
        match fut.await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err.into())
            }
        }
    }

    fn open_error(&self, inner: &BreakerInner) -> ResilienceError {
        let elapsed = inner
            .last_failure
            .map_or(Duration::ZERO, |at| at.elapsed());
        let remaining = self.recovery.saturating_sub(elapsed);
        ResilienceError::CircuitOpen {
            name: self.name.clone(),
            retry_after_secs: remaining.as_secs_f64().ceil() as u64,
        }
    }
}

impl Clone for CircuitBreaker {
    fn clone(&self) -> Self {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self {
            name: self.name.clone(),
            failure_threshold: self.failure_threshold,
            recovery: self.recovery,
            inner: Mutex::new(*inner),
        }
    }
}
