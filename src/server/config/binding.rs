//! Listener binding for [`FrameServer`].
//!
//! Binding moves a server from [`Unbound`] to [`Bound`]. A bound server may
//! be rebound; the previous listener is dropped and every other setting
//! carries over.

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::net::TcpListener;

use crate::server::{Bound, FrameServer, ServerError, ServerState, Unbound};

/// Open a blocking listener on `addr`.
fn listen(addr: SocketAddr) -> Result<StdTcpListener, ServerError> {
    StdTcpListener::bind(addr).map_err(ServerError::Bind)
}

impl<S> FrameServer<S>
where
    S: ServerState,
{
    /// Swap the typestate for a tokio listener built from `std_listener`.
    fn attach(self, std_listener: StdTcpListener) -> Result<FrameServer<Bound>, ServerError> {
        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = Arc::new(TcpListener::from_std(std_listener).map_err(ServerError::Bind)?);
        Ok(FrameServer {
            analyzer: self.analyzer,
            workers: self.workers,
            ready_tx: self.ready_tx,
            backoff_config: self.backoff_config,
            handshake: self.handshake,
            state: Bound { listener },
        })
    }
}

impl FrameServer<Unbound> {
    /// Always `None`: there is no listener yet.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }

    /// Listen on `addr`. Port 0 picks an ephemeral port.
    ///
    /// ```
    /// use visionframe::{analysis::FrameAnalyzer, server::FrameServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), visionframe::server::ServerError> {
    /// let server = FrameServer::new(FrameAnalyzer::image_summary())
    ///     .bind("127.0.0.1:0".parse().expect("literal address"))?;
    /// let addr = server.local_addr().expect("bound servers report an address");
    /// assert_ne!(addr.port(), 0);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is unavailable or the socket
    /// cannot be switched to non-blocking mode.
    pub fn bind(self, addr: SocketAddr) -> Result<FrameServer<Bound>, ServerError> {
        self.attach(listen(addr)?)
    }

    /// Serve on a listener the caller already opened, e.g. one inherited
    /// from a supervisor.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the socket cannot be switched to
    /// non-blocking mode.
    pub fn bind_existing_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<FrameServer<Bound>, ServerError> {
        self.attach(std_listener)
    }
}

impl FrameServer<Bound> {
    /// Address the listener accepted on, if the OS still reports one.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }

    /// Replace the listener with a fresh one on `addr`.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] under the same conditions as an unbound `bind`.
    pub fn bind(self, addr: SocketAddr) -> Result<Self, ServerError> { self.attach(listen(addr)?) }

    /// Replace the listener with `std_listener`.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the socket cannot be made non-blocking.
    pub fn bind_existing_listener(self, std_listener: StdTcpListener) -> Result<Self, ServerError> {
        self.attach(std_listener)
    }
}
