#![doc(html_root_url = "https://docs.rs/visionframe/latest")]
//! Public API for the `visionframe` library.
//!
//! A WebSocket server that receives base64-encoded images, one per text
//! message, and answers each with a JSON analysis: either a people count from
//! an injected [`Detector`](detect::Detector) or a summary of the image's
//! dimensions and format. Each connection runs its own sequential pipeline,
//! and a bad frame never closes the stream.

pub mod analysis;
pub mod codec;
pub mod detect;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod panic;
pub mod pipeline;
pub mod response;
pub mod server;
pub mod session;

pub use analysis::{AnalysisOutcome, AnalysisVariant, FrameAnalyzer};
pub use detect::{Detection, Detector, StaticDetector};
pub use error::{AnalysisError, ErrorKind, TransportError};
pub use metrics::{CONNECTION_PANICS, CONNECTIONS_ACTIVE, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use pipeline::{CloseReason, ConnectionPipeline, ConnectionState, PipelineReport};
pub use response::{AnalysisPayload, WireMessage};
pub use server::{BackoffConfig, FrameServer, ServerError};
pub use session::ConnectionId;
