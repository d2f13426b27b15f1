//! Fixed-interval retries with a bounded attempt count.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::Clock;

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    /// Every attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error that must not be retried.
    #[error("{0}")]
    Permanent(E),
}

impl<E: fmt::Display> RetryError<E> {
    /// Returns the underlying error from the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent(err) => err,
        }
    }
}

/// Retry an operation up to `max_attempts` times, sleeping `interval` between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,

    /// Delay between consecutive attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Create a fixed-interval policy.
    pub const fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Run `op`, retrying while `is_transient` says the error is worth another try.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        clock: &dyn Clock,
        operation: &str,
        mut op: F,
        is_transient: P,
    ) -> Result<T, RetryError<E>>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !is_transient(&err) => return Err(RetryError::Permanent(err)),
                Err(err) if attempt >= max_attempts => {
                    warn!(
                        operation,
                        attempts = attempt,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    debug!(
                        operation,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    clock.sleep(self.interval).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Default registration retry policy: artifacts usually become visible within seconds.
pub const DEFAULT_REGISTRATION_RETRY: RetryPolicy = RetryPolicy::fixed(10, Duration::from_secs(2));
