//! Helpers for running a real `FrameServer` on a loopback port.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use tokio::{sync::oneshot, task::JoinHandle};
use visionframe::server::{FrameServer, ServerError};

use crate::TestResult;

/// Create a TCP listener bound to a free local port.
///
/// # Errors
///
/// Returns any IO error encountered while binding to an ephemeral localhost
/// port.
pub fn unused_listener() -> std::io::Result<StdTcpListener> {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr)
}

/// A server running in the background until [`TestServer::shutdown`].
pub struct TestServer {
    addr: SocketAddr,
    path: String,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Bind `server` to a free port, start it, and wait until it is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the server stops before
    /// signalling readiness.
    pub async fn start(server: FrameServer) -> TestResult<Self> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let path = server.route().to_owned();
        let server = server
            .ready_signal(ready_tx)
            .bind_existing_listener(unused_listener()?)?;
        let addr = server.local_addr().ok_or("bound server has no address")?;
        let handle = tokio::spawn(server.run_with_shutdown(async {
            let _ = stop_rx.await;
        }));
        ready_rx.await?;
        Ok(Self {
            addr,
            path,
            stop: Some(stop_tx),
            handle,
        })
    }

    /// Listening address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// `ws://` URL of the configured route.
    #[must_use]
    pub fn url(&self) -> String { self.url_for(&self.path) }

    /// `ws://` URL of an arbitrary path on this server.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String { format!("ws://{}{path}", self.addr) }

    /// Signal shutdown and wait for the server to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the server task panicked or failed.
    pub async fn shutdown(mut self) -> TestResult {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.handle).await??;
        Ok(())
    }
}
