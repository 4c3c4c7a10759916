//! Panic payload formatting.
//!
//! A panic inside one frame's analysis or one connection task is caught and
//! turned into text for the client and the logs.

use std::{any::Any, fmt};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use visionframe::panic::format_panic;
/// assert_eq!(format_panic(Box::new("detector blew up")).to_string(), "detector blew up");
/// assert_eq!(
///     format_panic(Box::new(String::from("bad tensor"))).to_string(),
///     "bad tensor"
/// );
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

/// Describe a failed blocking task: its panic payload, or the cancellation.
pub fn describe_join_error(error: tokio::task::JoinError) -> String {
    match error.try_into_panic() {
        Ok(payload) => format_panic(payload).to_string(),
        Err(error) => error.to_string(),
    }
}
