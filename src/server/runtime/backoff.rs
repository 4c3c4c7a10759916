//! Retry pacing for failed `accept()` calls.

use std::time::Duration;

const FLOOR: Duration = Duration::from_millis(1);

/// Exponential retry schedule for the accept loop.
///
/// After a failed accept a worker sleeps for the current delay, then doubles
/// it for the next failure until `max_delay` is reached. A successful accept
/// restarts the schedule at `initial_delay`. Defaults are 10 ms and 1 s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Sleep after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any sleep.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Raise both delays to at least 1 ms and order them.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use visionframe::server::BackoffConfig;
    ///
    /// let swapped = BackoffConfig {
    ///     initial_delay: Duration::from_millis(200),
    ///     max_delay: Duration::ZERO,
    /// }
    /// .normalized();
    /// assert_eq!(swapped.initial_delay, Duration::from_millis(1));
    /// assert_eq!(swapped.max_delay, Duration::from_millis(200));
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let a = self.initial_delay.max(FLOOR);
        let b = self.max_delay.max(FLOOR);
        Self {
            initial_delay: a.min(b),
            max_delay: a.max(b),
        }
    }

    /// Sleep to use after the one that lasted `current`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}
