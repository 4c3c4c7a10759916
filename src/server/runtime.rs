//! Runtime control for [`FrameServer`].

mod accept;
mod backoff;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::warn;
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, FrameServer, ServerError, connection::ConnectionContext};

impl FrameServer<Bound> {
    /// Serve until Ctrl-C.
    ///
    /// ```no_run
    /// use visionframe::{analysis::FrameAnalyzer, server::FrameServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), visionframe::server::ServerError> {
    /// FrameServer::new(FrameAnalyzer::image_summary())
    ///     .path("/stream")
    ///     .bind("0.0.0.0:8000".parse().expect("literal address"))?
    ///     .run()
    ///     .await
    /// # }
    /// ```
    ///
    /// Only bound servers can run:
    ///
    /// ```compile_fail
    /// use visionframe::{analysis::FrameAnalyzer, server::FrameServer};
    ///
    /// async fn unbound() {
    ///     let _ = FrameServer::new(FrameAnalyzer::image_summary()).run().await;
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// None at present. Accept failures are logged and retried after a
    /// back-off delay.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            if let Err(error) = signal::ctrl_c().await {
                warn!("ctrl-c handler unavailable, shutting down: {error}");
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves.
    ///
    /// Shutdown stops every accept loop and cancels the token each pipeline
    /// watches between frames. A pipeline answers the frame it is working on,
    /// sends a Close frame, and exits. This call returns once every
    /// connection task has finished.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use visionframe::{analysis::FrameAnalyzer, server::FrameServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), visionframe::server::ServerError> {
    /// FrameServer::new(FrameAnalyzer::image_summary())
    ///     .workers(1)
    ///     .bind("127.0.0.1:0".parse().expect("literal address"))?
    ///     .run_with_shutdown(tokio::time::sleep(Duration::from_millis(10)))
    ///     .await
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let Bound { listener } = self.state;
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let context = ConnectionContext {
            analyzer: self.analyzer,
            handshake: self.handshake,
            shutdown: token.clone(),
        };

        tracing::info!(
            workers = self.workers,
            addr = ?listener.local_addr().ok(),
            path = %context.handshake.path,
            "frame server listening"
        );
        for _ in 0..self.workers {
            let options = AcceptLoopOptions {
                context: context.clone(),
                shutdown: token.clone(),
                tracker: tracker.clone(),
                backoff: self.backoff_config,
            };
            tracker.spawn(accept_loop(Arc::clone(&listener), options));
        }

        if let Some(tx) = self.ready_tx
            && tx.send(()).is_err()
        {
            warn!("ready signal dropped: receiver went away");
        }

        select! {
            () = shutdown => token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!("frame server stopped");
        Ok(())
    }
}
