//! Utilities for driving `visionframe` pipelines and servers in tests.
//!
//! The pipeline helpers run a [`ConnectionPipeline`] over an in-memory
//! WebSocket built on `tokio::io::duplex`, send a scripted list of client
//! messages, and collect every JSON reply for assertions.
//!
//! ```rust
//! use visionframe::analysis::FrameAnalyzer;
//! use visionframe_testing::{drive_text_frames, png_data_url};
//!
//! # async fn example() -> visionframe_testing::TestResult {
//! let run = drive_text_frames(FrameAnalyzer::image_summary(), [png_data_url(8, 8)]).await?;
//! assert_eq!(run.analyses().count(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! [`ConnectionPipeline`]: visionframe::pipeline::ConnectionPipeline

pub mod detectors;
pub mod drive;
pub mod images;
pub mod logging;
pub mod server;

pub use detectors::{FailingDetector, PanickingDetector, people};
pub use drive::{Ending, PipelineRun, drive_pipeline, drive_text_frames};
pub use images::{data_url, gray_png, png_data_url, solid_jpeg, solid_png};
pub use logging::{LoggerHandle, logger};
pub use server::{TestServer, unused_listener};

/// Result type used by fallible test helpers and test functions.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
