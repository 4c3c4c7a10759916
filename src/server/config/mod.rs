//! Configuration utilities for [`FrameServer`].

use std::{sync::Arc, time::Duration};

use tokio::sync::oneshot;

use super::{BackoffConfig, FrameServer, HandshakeConfig, ServerState, Unbound};
use crate::analysis::FrameAnalyzer;

pub mod binding;


impl FrameServer<Unbound> {
    /// Create a new `FrameServer` sharing `analyzer` across connections.
    ///
    /// The worker count defaults to the number of available CPU cores (or 1
    /// if this cannot be determined). The TCP listener is unset; call
    /// [`bind`](Self::bind) before running the server.
    ///
    /// ```
    /// use visionframe::{analysis::FrameAnalyzer, server::FrameServer};
    ///
    /// let server = FrameServer::new(FrameAnalyzer::image_summary()).workers(2);
    /// assert_eq!(server.worker_count(), 2);
    /// assert_eq!(server.route(), "/ws");
    /// ```
    #[must_use]
    pub fn new(analyzer: FrameAnalyzer) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            analyzer: Arc::new(analyzer),
            workers,
            ready_tx: None,
            backoff_config: BackoffConfig::default(),
            handshake: HandshakeConfig::default(),
            state: Unbound,
        }
    }
}

impl<S> FrameServer<S>
where
    S: ServerState,
{
    /// Set the number of worker tasks to spawn for the server.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Configure the accept-loop back-off.
    ///
    /// Values are normalised: delays below 1 ms are raised, and an inverted
    /// pair is swapped.
    #[must_use]
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff_config = config.normalized();
        self
    }

    /// Limit how long a client may take to complete the WebSocket upgrade.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Set the request path accepted for the WebSocket upgrade.
    ///
    /// A missing leading `/` is added. Requests for any other path are
    /// refused with `404 Not Found`.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{path}")
        };
        self.handshake.path = Arc::from(path);
        self
    }

    /// Cap the size of a single inbound message in bytes.
    #[must_use]
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.handshake.max_message_size = bytes.max(1);
        self
    }

    /// Configure a channel used to signal when the server is ready to accept
    /// connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Returns the configured number of worker tasks for the server.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize { self.workers }

    /// Returns the configured back-off.
    #[must_use]
    pub const fn backoff_config(&self) -> BackoffConfig { self.backoff_config }

    /// Returns the WebSocket route.
    #[must_use]
    pub fn route(&self) -> &str { &self.handshake.path }

    /// Returns the handshake timeout.
    #[must_use]
    pub const fn handshake_deadline(&self) -> Duration { self.handshake.timeout }

    /// Returns the inbound message size cap.
    #[must_use]
    pub const fn message_size_limit(&self) -> usize { self.handshake.max_message_size }

    /// Returns the shared analyzer.
    #[must_use]
    pub fn analyzer(&self) -> &FrameAnalyzer { &self.analyzer }
}
