//! Fixtures for server unit tests.

use std::net::TcpListener as StdTcpListener;

use rstest::fixture;

use super::{Bound, FrameServer};
use crate::analysis::FrameAnalyzer;

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn analyzer() -> FrameAnalyzer { FrameAnalyzer::image_summary() }

/// A loopback listener on an ephemeral port, held open until the test
/// hands it to a server.
#[fixture]
pub fn free_listener() -> StdTcpListener {
    StdTcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral loopback port")
}

/// Wrap `listener` in a server running `analyzer`. Needs a tokio runtime.
pub fn bind_server(analyzer: FrameAnalyzer, listener: StdTcpListener) -> FrameServer<Bound> {
    FrameServer::new(analyzer)
        .bind_existing_listener(listener)
        .expect("adopt test listener")
}
