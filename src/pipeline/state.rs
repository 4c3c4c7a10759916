//! Connection lifecycle states.

use std::fmt;

/// Stage of a connection's lifecycle.
///
/// Every connection visits the states in declaration order; only `Looping`
/// spans more than one inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// The transport handshake is completing.
    Accepting,
    /// The greeting is being sent.
    Greeting,
    /// Frames are being received and answered.
    Looping,
    /// The transport is being closed.
    Closing,
    /// All per-connection state has been released.
    Closed,
}

impl ConnectionState {
    /// Lower-case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepting => "accepting",
            Self::Greeting => "greeting",
            Self::Looping => "looping",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// Whether `next` may follow `self`.
    ///
    /// `Closing` is reachable from every open state because a transport
    /// failure can end the connection at any point after the upgrade.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Accepting, Self::Greeting)
                | (Self::Greeting, Self::Looping)
                | (Self::Accepting | Self::Greeting | Self::Looping, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Returns true once the connection has been torn down.
    #[must_use]
    pub const fn is_closed(self) -> bool { matches!(self, Self::Closed) }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame.
    PeerClosed,
    /// The transport ended without a close handshake.
    Disconnected,
    /// The server is shutting down.
    Shutdown,
    /// A transport error ended the connection.
    TransportError,
}
