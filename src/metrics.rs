//! Metric helpers for `visionframe`.
//!
//! Thin wrappers over the [`metrics`](https://docs.rs/metrics) macros. With
//! the `metrics` feature disabled every helper compiles to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::error::ErrorKind;

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "visionframe_connections_active";
/// Name of the counter tracking analysed frames.
pub const FRAMES_PROCESSED: &str = "visionframe_frames_processed_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "visionframe_errors_total";
/// Name of the counter tracking panicked connection tasks.
pub const CONNECTION_PANICS: &str = "visionframe_connection_panics_total";

/// Result of analysing one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every stage succeeded.
    Success,
    /// A stage failed and the failure was sent to the client.
    Failure,
}

impl Outcome {
    /// Label value for [`FRAMES_PROCESSED`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an analysed frame.
pub fn inc_frames(outcome: Outcome) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "outcome" => outcome.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record an error of the given category.
pub fn inc_errors(kind: ErrorKind) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a panicked connection task.
pub fn inc_connection_panics() {
    #[cfg(feature = "metrics")]
    counter!(CONNECTION_PANICS).increment(1);
}
