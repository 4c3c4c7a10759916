//! Accept loop feeding WebSocket connections to their pipelines.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::server::{
    ServerError,
    connection::{ConnectionContext, spawn_connection_task},
};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Debug)]
pub(in crate::server) struct AcceptLoopOptions {
    pub context: ConnectionContext,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accepts incoming connections and spawns a pipeline task for each.
///
/// Failures to accept a connection trigger an exponential back-off governed
/// by `options.backoff`; a successful accept resets the delay. The loop
/// terminates when `options.shutdown` is cancelled, and all spawned tasks are
/// tracked by `options.tracker` for graceful shutdown.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + Send + Sync + 'static,
{
    let AcceptLoopOptions {
        context,
        shutdown,
        tracker,
        backoff,
    } = options;
    let backoff = backoff.normalized();
    debug_assert!(
        backoff.initial_delay <= backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let mut delay = backoff.initial_delay;
    while let Some(next_delay) =
        accept_iteration(listener.as_ref(), &context, &shutdown, &tracker, &backoff, delay).await
    {
        delay = next_delay;
    }
}

async fn accept_iteration<L>(
    listener: &L,
    context: &ConnectionContext,
    shutdown: &CancellationToken,
    tracker: &TaskTracker,
    backoff: &BackoffConfig,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener,
{
    select! {
        biased;

        () = shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "accepted tcp connection");
                spawn_connection_task(stream, context.clone(), tracker);
                backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                let error = ServerError::Accept(e);
                tracing::warn!(%error, ?local_addr, retry_in = ?delay, "accept failed, backing off");
                select! {
                    biased;

                    () = shutdown.cancelled() => return None,
                    () = sleep(delay) => {}
                }
                backoff.next_delay(delay)
            }
        }),
    }
}
