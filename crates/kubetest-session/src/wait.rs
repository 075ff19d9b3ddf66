//! Bounded polling of a readiness condition

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::readiness::Condition;

/// Result of waiting on a condition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Whether the condition held before the deadline
    pub ready: bool,
    /// Time spent waiting
    pub elapsed: Duration,
    /// Number of evaluations performed
    pub attempts: u32,
    /// Last evaluation error, if any evaluation failed
    pub last_error: Option<String>,
}

/// Polls a condition every `poll_interval` until it holds or `timeout` passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitStrategy {
    timeout: Duration,
    poll_interval: Duration,
}

impl WaitStrategy {
    /// Create a strategy
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Overall deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time between evaluations
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait for `condition`.
    ///
    /// The condition is evaluated immediately, so an already satisfied
    /// condition returns ready even with a zero timeout. Evaluation errors
    /// count as "not ready yet" and polling continues; the most recent one is
    /// reported in [`WaitOutcome::last_error`].
    pub async fn wait_for(&self, condition: &dyn Condition) -> WaitOutcome {
        let start = Instant::now();
        let mut attempts = 0u32;
        let mut last_error = None;

        loop {
            attempts += 1;
            match condition.evaluate().await {
                Ok(true) => {
                    debug!(attempts, condition = %condition.describe(), "condition satisfied");
                    return WaitOutcome {
                        ready: true,
                        elapsed: start.elapsed(),
                        attempts,
                        last_error,
                    };
                }
                Ok(false) => {
                    trace!(attempts, "condition not yet met, retrying");
                }
                Err(e) => {
                    trace!(attempts, error = %e, "condition check returned error (retrying)");
                    last_error = Some(e.to_string());
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                debug!(
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    condition = %condition.describe(),
                    "condition not satisfied before timeout"
                );
                return WaitOutcome {
                    ready: false,
                    elapsed,
                    attempts,
                    last_error,
                };
            }

            // Never sleep past the deadline
            tokio::time::sleep(self.poll_interval.min(self.timeout - elapsed)).await;
        }
    }
}
