//! Tokio-based WebSocket server for frame analysis.
//!
//! `FrameServer` spawns worker tasks that accept TCP connections, upgrade
//! them to WebSocket on the configured path, and hand each upgraded stream
//! to its own [`ConnectionPipeline`](crate::pipeline::ConnectionPipeline).
//! Every connection shares one [`FrameAnalyzer`].

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::analysis::FrameAnalyzer;

/// Tokio-based server running one pipeline per WebSocket client.
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// (not yet bound to a TCP listener) or [`Bound`]. New servers start
/// `Unbound` and must call [`bind`](FrameServer::bind) or
/// [`bind_existing_listener`](FrameServer::bind_existing_listener) before
/// running. Each worker task runs its own accept loop over the shared
/// listener. The server listens for a shutdown signal using
/// `tokio::signal::ctrl_c` and notifies all workers to stop accepting new
/// connections.
pub struct FrameServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) analyzer: Arc<FrameAnalyzer>,
    pub(crate) workers: usize,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so
    /// a new sender must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) backoff_config: BackoffConfig,
    pub(crate) handshake: HandshakeConfig,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
pub use config::binding;
mod connection;
pub mod error;
mod runtime;

pub(crate) use connection::HandshakeConfig;
pub use connection::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PATH};
pub use error::ServerError;
/// Re-exported configuration types for server backoff behavior.
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
