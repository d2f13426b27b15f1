//! Bounded waiting primitives.
//!
//! Every wait in the harness is bounded: either by a wall-clock [`Budget`]
//! or by a fixed number of attempts in a [`RetryPolicy`]. Time is read and
//! spent through an injected [`Clock`], so tests can run a two-minute poll
//! in microseconds with a [`ManualClock`].
//!
//! # Invariants
//!
//! - No loop built from these primitives runs unbounded
//! - Waiting is sequential; nothing here spawns work
//! - A [`Budget`] never sleeps past its deadline

mod clock;
mod retry;

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::{RetryError, RetryPolicy, DEFAULT_REGISTRATION_RETRY};

/// Waiting errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// The budget ran out before the condition held.
    #[error("timeout after {elapsed:?} waiting for {resource}")]
    Timeout {
        resource: String,
        elapsed: Duration,
    },
}

/// A wall-clock countdown read through a [`Clock`].
pub struct Budget<'a> {
    clock: &'a dyn Clock,
    started: Instant,
    total: Duration,
}

impl<'a> Budget<'a> {
    /// Start counting down `total` from the clock's current time.
    pub fn start(clock: &'a dyn Clock, total: Duration) -> Self {
        Self {
            clock,
            started: clock.now(),
            total,
        }
    }

    /// The budget this countdown started with.
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Time spent since the countdown started.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started)
    }

    /// Time left, zero once exhausted.
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    /// Returns true once no time remains.
    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Sleep for `interval`, clipped so the deadline is never overshot.
    pub async fn sleep(&self, interval: Duration) {
        let step = interval.min(self.remaining());
        if !step.is_zero() {
            self.clock.sleep(step).await;
        }
    }
}

/// Poll `probe` every `interval` until it yields a value or the budget runs out.
///
/// The probe is always called at least once, even with a zero budget.
pub async fn poll_until<T, F, Fut>(
    clock: &dyn Clock,
    total: Duration,
    interval: Duration,
    resource: &str,
    mut probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let budget = Budget::start(clock, total);

    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }

        if budget.is_exhausted() {
            return Err(WaitError::Timeout {
                resource: resource.to_string(),
                elapsed: budget.elapsed(),
            });
        }

        budget.sleep(interval).await;
    }
}

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default budget for a deployment to reach a terminal state.
pub const DEFAULT_DEPLOYMENT_TIMEOUT: Duration = Duration::from_secs(120);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_budget_never_overshoots() {
        let clock = ManualClock::new();
        let budget = Budget::start(&clock, Duration::from_millis(2500));

        while !budget.is_exhausted() {
            budget.sleep(Duration::from_secs(1)).await;
        }

        assert_eq!(budget.elapsed(), Duration::from_millis(2500));
        assert_eq!(clock.sleep_count(), 3);
    }

    #[tokio::test]
    async fn test_budget_remaining() {
        let clock = ManualClock::new();
        let budget = Budget::start(&clock, Duration::from_secs(10));
        clock.advance(Duration::from_secs(4));
        assert_eq!(budget.remaining(), Duration::from_secs(6));
        clock.advance(Duration::from_secs(7));
        assert!(budget.is_exhausted());
        assert_eq!(budget.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_poll_until_success() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let value = poll_until(
            &clock,
            Duration::from_secs(30),
            Duration::from_secs(1),
            "counter",
            || {
                calls += 1;
                let current = calls;
                async move { (current == 4).then_some(current) }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 4);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_poll_until_timeout() {
        let clock = ManualClock::new();
        let result: Result<(), _> = poll_until(
            &clock,
            Duration::from_secs(5),
            Duration::from_secs(1),
            "never",
            || async { None },
        )
        .await;

        assert_eq!(
            result,
            Err(WaitError::Timeout {
                resource: "never".to_string(),
                elapsed: Duration::from_secs(5),
            })
        );
    }
}
