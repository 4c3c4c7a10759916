//! Count of live pipelines.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{metrics, session::ConnectionId};

static LIVE_PIPELINES: AtomicU64 = AtomicU64::new(0);

/// Held by a running pipeline; counted from creation until drop.
#[derive(Debug)]
pub(super) struct ActiveConnection {
    id: ConnectionId,
}

impl ActiveConnection {
    pub(super) fn new(id: ConnectionId) -> Self {
        let live = LIVE_PIPELINES.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::inc_connections();
        tracing::trace!(%id, live, "pipeline registered");
        Self { id }
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        let live = LIVE_PIPELINES.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::dec_connections();
        tracing::trace!(id = %self.id, live, "pipeline released");
    }
}

/// Number of pipelines currently running in this process.
#[must_use]
pub fn active_connection_count() -> u64 { LIVE_PIPELINES.load(Ordering::Relaxed) }

