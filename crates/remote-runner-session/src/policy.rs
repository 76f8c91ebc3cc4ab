//! Reconnect policy.

use std::time::Duration;

/// Delay between an unsolicited close and the next connect attempt.
pub const RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Consecutive unsolicited closes tolerated before giving up.
pub const RETRY_CEILING: u32 = 5;

/// Fixed-delay, bounded reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before each automatic reconnect.
    pub delay: Duration,
    /// Number of consecutive closes that ends in `Failed`.
    pub ceiling: u32,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(delay: Duration, ceiling: u32) -> Self {
        Self { delay, ceiling }
    }

    /// Whether the `count`-th consecutive close exhausts the budget.
    #[must_use]
    pub const fn is_exhausted(&self, count: u32) -> bool {
        count >= self.ceiling
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RETRY_DELAY, RETRY_CEILING)
    }
}
