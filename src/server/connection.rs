//! Connection handling for [`FrameServer`](super::FrameServer).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::FutureExt;
use log::{error, warn};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    WebSocketStream,
    accept_hdr_async_with_config,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        protocol::WebSocketConfig,
    },
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    analysis::FrameAnalyzer,
    error::TransportError,
    metrics,
    panic::format_panic,
    pipeline::ConnectionPipeline,
    session::ConnectionId,
};

/// Route accepted for the WebSocket upgrade unless configured otherwise.
pub const DEFAULT_PATH: &str = "/ws";
/// Time a client has to complete the upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Largest inbound message accepted, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 << 20;

/// Settings applied while upgrading a TCP stream.
#[derive(Clone, Debug)]
pub(crate) struct HandshakeConfig {
    pub(crate) path: Arc<str>,
    pub(crate) timeout: Duration,
    pub(crate) max_message_size: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            path: Arc::from(DEFAULT_PATH),
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl HandshakeConfig {
    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

/// Per-connection inputs shared by every task an accept loop spawns.
#[derive(Clone, Debug)]
pub(crate) struct ConnectionContext {
    pub(crate) analyzer: Arc<FrameAnalyzer>,
    pub(crate) handshake: HandshakeConfig,
    pub(crate) shutdown: CancellationToken,
}

/// Spawn a task to process a single TCP connection, logging and discarding
/// any panics.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    context: ConnectionContext,
    tracker: &TaskTracker,
) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Failed to retrieve peer address: error={e}");
            None
        }
    };
    let id = ConnectionId::next();
    tracker.spawn(async move {
        let fut = std::panic::AssertUnwindSafe(process_stream(stream, id, peer_addr, context))
            .catch_unwind();

        if let Err(panic) = fut.await {
            metrics::inc_connection_panics();
            let panic_msg = format_panic(panic);
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
            tracing::error!(panic = %panic_msg, ?peer_addr, %id, "connection task panicked");
        }
    });
}

async fn process_stream(
    stream: TcpStream,
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    context: ConnectionContext,
) {
    let ConnectionContext {
        analyzer,
        handshake,
        shutdown,
    } = context;

    let upgraded = tokio::select! {
        biased;

        () = shutdown.cancelled() => {
            tracing::debug!(%id, ?peer_addr, "shutdown before websocket upgrade completed");
            return;
        }
        result = upgrade(stream, &handshake) => result,
    };
    let ws = match upgraded {
        Ok(ws) => ws,
        Err(e) => {
            metrics::inc_errors(e.kind());
            tracing::warn!(%id, error = %e, ?peer_addr, "websocket upgrade failed");
            return;
        }
    };
    tracing::info!(%id, ?peer_addr, "websocket client connected");

    match ConnectionPipeline::new(id, ws, analyzer, shutdown).run().await {
        Ok(report) => tracing::debug!(
            %id,
            frames = report.frames,
            reason = ?report.reason,
            "pipeline finished"
        ),
        Err(e) => error!("connection failed: id={id}, error={e}, peer_addr={peer_addr:?}"),
    }
}

/// Complete the WebSocket upgrade on `stream`.
///
/// Requests for any path other than the configured route are refused with
/// `404 Not Found`.
pub(crate) async fn upgrade(
    stream: TcpStream,
    config: &HandshakeConfig,
) -> Result<WebSocketStream<TcpStream>, TransportError> {
    let path = Arc::clone(&config.path);
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == &*path {
            Ok(response)
        } else {
            Err(not_found(request.uri().path()))
        }
    };
    let upgrade =
        accept_hdr_async_with_config(stream, check_path, Some(config.websocket_config()));
    match timeout(config.timeout, upgrade).await {
        Ok(result) => result.map_err(TransportError::Handshake),
        Err(_) => Err(TransportError::HandshakeTimeout),
    }
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("no websocket endpoint at {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };
    use tokio_util::task::TaskTracker;
    use tracing_test::traced_test;

    use super::*;

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("listener.local_addr");
        (listener, addr)
    }

    fn context(timeout: Duration) -> ConnectionContext {
        ConnectionContext {
            analyzer: Arc::new(FrameAnalyzer::image_summary()),
            handshake: HandshakeConfig {
                timeout,
                ..HandshakeConfig::default()
            },
            shutdown: CancellationToken::new(),
        }
    }

    #[test]
    fn websocket_config_applies_message_cap() {
        let config = HandshakeConfig {
            max_message_size: 1024,
            ..HandshakeConfig::default()
        };
        let ws = config.websocket_config();
        assert_eq!(ws.max_message_size, Some(1024));
        assert_eq!(ws.max_frame_size, Some(1024));
    }

    #[test]
    fn not_found_response_carries_404() {
        let response = not_found("/elsewhere");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(
            response
                .body()
                .as_deref()
                .is_some_and(|b| b.contains("/elsewhere"))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn non_websocket_client_fails_the_handshake() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            upgrade(stream, &HandshakeConfig::default()).await
        });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        client
            .write_all(b"GET /ws HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .expect("write request");

        let result = server.await.expect("join");
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn silent_client_times_out() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let config = HandshakeConfig {
                timeout: Duration::from_millis(50),
                ..HandshakeConfig::default()
            };
            upgrade(stream, &config).await
        });

        let _client = TcpStream::connect(addr).await.expect("connect");
        let result = server.await.expect("join");
        assert!(matches!(result, Err(TransportError::HandshakeTimeout)));
    }

    #[rstest]
    #[tokio::test]
    async fn shutdown_abandons_pending_upgrade() {
        let (listener, addr) = listener().await;
        let context = context(Duration::from_secs(30));
        let shutdown = context.shutdown.clone();
        let tracker = TaskTracker::new();
        let accepting = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                let (stream, _) = listener.accept().await.expect("accept");
                spawn_connection_task(stream, context, &tracker);
            }
        });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        accepting.await.expect("join accept task");
        shutdown.cancel();
        tracker.close();
        timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("connection task outlived shutdown");

        let mut buf = [0_u8; 64];
        let read = timeout(Duration::from_secs(1), client.read(&mut buf))
            .await
            .expect("server kept the socket open");
        assert!(matches!(read, Ok(0) | Err(_)), "unexpected bytes from server");
    }

    /// A client that never upgrades is logged and does not take the worker
    /// down with it.
    #[rstest]
    #[traced_test]
    #[tokio::test]
    async fn failed_upgrade_is_logged() {
        let (listener, addr) = listener().await;
        let tracker = TaskTracker::new();
        let handle = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                let (stream, _) = listener.accept().await.expect("accept");
                spawn_connection_task(stream, context(Duration::from_millis(20)), &tracker);
                tracker.close();
                tracker.wait().await;
            }
        });

        let client = TcpStream::connect(addr).await.expect("connect");
        handle.await.expect("join connection task driver");
        drop(client);

        assert!(logs_contain("websocket upgrade failed"));
    }
}
