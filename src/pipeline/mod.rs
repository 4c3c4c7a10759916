//! Per-connection pipeline.
//!
//! A [`ConnectionPipeline`] owns one upgraded WebSocket. It greets the client,
//! then answers every inbound text frame with exactly one outbound message, in
//! order, until the peer closes, the transport fails, or the server shuts
//! down. Per-frame analysis runs on the blocking pool so a slow detector
//! stalls only this connection, and a panic inside it becomes an `error`
//! message instead of ending the connection.

mod counter;
mod state;

use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{
    self,
    Message,
    Utf8Bytes,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use self::{
    counter::active_connection_count,
    state::{CloseReason, ConnectionState},
};
use self::counter::ActiveConnection;
use crate::{
    analysis::{AnalysisOutcome, FrameAnalyzer},
    error::{ErrorKind, TransportError},
    metrics,
    panic::describe_join_error,
    response::{PayloadShape, WireMessage},
    session::ConnectionId,
};

/// Message sent in reply to a binary frame.
const BINARY_UNSUPPORTED: &str = "binary frames are not supported; send base64 text";

/// Summary of a finished connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineReport {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Number of inbound frames answered.
    pub frames: u64,
    /// Why the connection ended.
    pub reason: CloseReason,
    /// Every state visited, in order.
    pub lifecycle: Vec<ConnectionState>,
}

/// Sequential receive, analyse, respond loop for one client.
pub struct ConnectionPipeline<S> {
    id: ConnectionId,
    stream: S,
    analyzer: Arc<FrameAnalyzer>,
    shape: PayloadShape,
    shutdown: CancellationToken,
    lifecycle: Vec<ConnectionState>,
    frames: u64,
}

impl<S> ConnectionPipeline<S>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin
        + Send,
{
    /// Create a pipeline over an already upgraded `stream`.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        stream: S,
        analyzer: Arc<FrameAnalyzer>,
        shutdown: CancellationToken,
    ) -> Self {
        let shape = PayloadShape::from(analyzer.variant());
        Self {
            id,
            stream,
            analyzer,
            shape,
            shutdown,
            lifecycle: vec![ConnectionState::Accepting],
            frames: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle
            .last()
            .copied()
            .unwrap_or(ConnectionState::Accepting)
    }

    /// Drive the connection to completion.
    ///
    /// A peer that vanishes without a close handshake ends the pipeline
    /// cleanly with [`CloseReason::Disconnected`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when a send or receive fails for any reason
    /// other than the peer disconnecting.
    pub async fn run(mut self) -> Result<PipelineReport, TransportError> {
        let _active = ActiveConnection::new(self.id);
        info!(id = %self.id, "connection established");

        let result = self.drive().await;
        let reason = match result {
            Ok(reason) => reason,
            Err(ref error) if error.is_disconnect() => CloseReason::Disconnected,
            Err(_) => CloseReason::TransportError,
        };
        if self.state() != ConnectionState::Closing {
            self.transition(ConnectionState::Closing);
        }
        self.transition(ConnectionState::Closed);

        match result {
            Err(error) if reason == CloseReason::TransportError => {
                warn!(id = %self.id, error = %error, "connection ended by transport error");
                metrics::inc_errors(error.kind());
                Err(error)
            }
            _ => {
                info!(id = %self.id, frames = self.frames, ?reason, "connection closed");
                Ok(PipelineReport {
                    id: self.id,
                    frames: self.frames,
                    reason,
                    lifecycle: self.lifecycle,
                })
            }
        }
    }

    async fn drive(&mut self) -> Result<CloseReason, TransportError> {
        if self.shutdown.is_cancelled() {
            self.transition(ConnectionState::Closing);
            self.close(CloseReason::Shutdown).await;
            return Ok(CloseReason::Shutdown);
        }
        self.transition(ConnectionState::Greeting);
        self.send(&WireMessage::greeting()).await?;
        debug!(id = %self.id, "greeting sent");
        self.transition(ConnectionState::Looping);

        let reason = loop {
            let next = tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break CloseReason::Shutdown,
                next = self.stream.next() => next,
            };
            let Some(message) = next else {
                break CloseReason::Disconnected;
            };
            let message = match message {
                Ok(message) => message,
                Err(error) => return Err(self.receive_failed(error).await),
            };
            match message {
                Message::Text(text) => self.handle_text(text).await?,
                Message::Binary(bytes) => {
                    debug!(id = %self.id, len = bytes.len(), "rejecting binary frame");
                    metrics::inc_errors(ErrorKind::Processing);
                    self.send(&WireMessage::processing_error(BINARY_UNSUPPORTED))
                        .await?;
                }
                Message::Close(_) => break CloseReason::PeerClosed,
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        };

        self.transition(ConnectionState::Closing);
        self.close(reason).await;
        Ok(reason)
    }

    async fn handle_text(&mut self, text: Utf8Bytes) -> Result<(), TransportError> {
        debug!(id = %self.id, "received frame");
        let analyzer = Arc::clone(&self.analyzer);
        let analysis = tokio::task::spawn_blocking(move || analyzer.analyze(&text)).await;

        let reply = match analysis {
            Ok(outcome) => {
                record_outcome(&outcome);
                WireMessage::analysis(self.shape, &outcome)
            }
            Err(join_error) => {
                let message = describe_join_error(join_error);
                warn!(id = %self.id, panic = %message, "frame analysis panicked");
                metrics::inc_frames(metrics::Outcome::Failure);
                metrics::inc_errors(ErrorKind::Processing);
                WireMessage::processing_error(message)
            }
        };
        self.frames += 1;
        self.send(&reply).await
    }

    async fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(message.encode()))
            .await
            .map_err(TransportError::Send)
    }

    async fn close(&mut self, reason: CloseReason) {
        let result = if reason == CloseReason::Shutdown {
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: Utf8Bytes::from_static("server shutting down"),
            };
            self.stream.send(Message::Close(Some(frame))).await
        } else {
            self.stream.close().await
        };
        if let Err(error) = result {
            debug!(id = %self.id, error = %error, "close handshake incomplete");
        }
    }

    /// Turn a failed read into a [`TransportError`]. An oversized message
    /// gets a best-effort `1009` Close frame first.
    async fn receive_failed(&mut self, error: tungstenite::Error) -> TransportError {
        if let tungstenite::Error::Capacity(capacity) = &error {
            self.transition(ConnectionState::Closing);
            let frame = CloseFrame {
                code: CloseCode::Size,
                reason: capacity.to_string().into(),
            };
            if let Err(close_error) = self.stream.send(Message::Close(Some(frame))).await {
                debug!(id = %self.id, error = %close_error, "size close frame not delivered");
            }
        }
        TransportError::Receive(error)
    }

    fn transition(&mut self, next: ConnectionState) {
        let current = self.state();
        debug_assert!(
            current.can_transition_to(next),
            "invalid transition {current} -> {next}"
        );
        debug!(id = %self.id, from = %current, to = %next, "state transition");
        self.lifecycle.push(next);
    }
}

fn record_outcome(outcome: &AnalysisOutcome) {
    match outcome.error() {
        None => metrics::inc_frames(metrics::Outcome::Success),
        Some(error) => {
            metrics::inc_frames(metrics::Outcome::Failure);
            metrics::inc_errors(error.kind());
        }
    }
}
