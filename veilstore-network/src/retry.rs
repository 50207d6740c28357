//! Bounded retry policy
//!
//! A small, reusable attempt-count-plus-backoff object. Flows drive their
//! own loops with `attempts()` / `is_last()` / `pause()` so the policy
//! stays decoupled from the socket calls and testable on its own.

use std::time::Duration;

/// Bounded retry policy: a fixed attempt budget with a pause between
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed (at least 1)
    pub max_attempts: u32,
    /// Delay between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy; an attempt budget of 0 is clamped to 1
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Attempt numbers, starting at 1
    pub fn attempts(&self) -> impl Iterator<Item = u32> {
        1..=self.max_attempts
    }

    /// Whether this attempt exhausts the budget
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Sleep for the backoff interval
    pub async fn pause(&self) {
        tokio::time::sleep(self.backoff).await;
    }
}
