//! Per-frame analysis: decode, codec, detect.
//!
//! [`FrameAnalyzer`] runs the three recoverable stages for one text message
//! and folds their results into an [`AnalysisOutcome`]. Which analysis runs is
//! fixed when the analyzer is built ([`AnalysisVariant`]), never chosen per
//! frame.

use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    codec::{DecodedImage, decode_image},
    detect::{Detector, count_people},
    error::AnalysisError,
    frame::Frame,
};

/// The analysis a server performs on every frame.
#[derive(Clone)]
pub enum AnalysisVariant {
    /// Count people with the injected detector.
    PeopleDetection(Arc<dyn Detector>),
    /// Report dimensions, channels, format, and byte size of the image.
    ImageSummary,
}

impl AnalysisVariant {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PeopleDetection(_) => "people_detection",
            Self::ImageSummary => "image_summary",
        }
    }
}

impl fmt::Debug for AnalysisVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Descriptive fields of a decoded image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSummary {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Channel count.
    pub channels: u8,
    /// `"BGR"` or `"GRAY"`.
    pub format: &'static str,
    /// Length of the decoded (pre-codec) byte payload.
    pub size_bytes: usize,
}

impl ImageSummary {
    /// Summarise `image`, decoded from `size_bytes` raw bytes.
    #[must_use]
    pub fn new(image: &DecodedImage, size_bytes: usize) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: image.channels(),
            format: image.format_label(),
            size_bytes,
        }
    }
}

/// Fields of a successful analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisFields {
    /// Result of the people-detection variant.
    People {
        /// Number of `person` detections.
        people_count: usize,
    },
    /// Result of the image-summary variant.
    Image(ImageSummary),
}

/// Result of analysing one frame: success or failure, never both.
#[derive(Debug)]
pub enum AnalysisOutcome {
    /// Every stage succeeded.
    Success(AnalysisFields),
    /// A stage failed; later stages did not run.
    Failure(AnalysisError),
}

impl AnalysisOutcome {
    /// Returns true for [`AnalysisOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool { matches!(self, Self::Success(_)) }

    /// The failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&AnalysisError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }
}

impl From<Result<AnalysisFields, AnalysisError>> for AnalysisOutcome {
    fn from(result: Result<AnalysisFields, AnalysisError>) -> Self {
        match result {
            Ok(fields) => Self::Success(fields),
            Err(error) => Self::Failure(error),
        }
    }
}

/// Runs the per-frame stages for a configured [`AnalysisVariant`].
///
/// The analyzer holds no per-connection state and is shared between
/// connections behind an `Arc`.
#[derive(Clone, Debug)]
pub struct FrameAnalyzer {
    variant: AnalysisVariant,
}

impl FrameAnalyzer {
    /// Create an analyzer for `variant`.
    #[must_use]
    pub fn new(variant: AnalysisVariant) -> Self { Self { variant } }

    /// Analyzer counting people with `detector`.
    #[must_use]
    pub fn people_detection(detector: Arc<dyn Detector>) -> Self {
        Self::new(AnalysisVariant::PeopleDetection(detector))
    }

    /// Analyzer reporting image metadata.
    #[must_use]
    pub fn image_summary() -> Self { Self::new(AnalysisVariant::ImageSummary) }

    /// The configured variant.
    #[must_use]
    pub fn variant(&self) -> &AnalysisVariant { &self.variant }

    /// Analyse one transport text message.
    ///
    /// Never panics on bad input: every stage failure becomes
    /// [`AnalysisOutcome::Failure`].
    pub fn analyze(&self, text: &str) -> AnalysisOutcome {
        let outcome = AnalysisOutcome::from(self.try_analyze(text));
        if let AnalysisOutcome::Failure(error) = &outcome {
            warn!(kind = %error.kind(), %error, "frame analysis failed");
        }
        outcome
    }

    fn try_analyze(&self, text: &str) -> Result<AnalysisFields, AnalysisError> {
        let frame = Frame::decode(text)?;
        debug!(
            chars = frame.payload_chars(),
            bytes = frame.len(),
            media_type = ?frame.media_type(),
            "decoded frame"
        );
        let image = decode_image(frame.bytes())?;

        match &self.variant {
            AnalysisVariant::PeopleDetection(detector) => {
                let detections = detector.detect(&image)?;
                let people_count = count_people(&detections);
                info!(people_count, "detected people in image");
                Ok(AnalysisFields::People { people_count })
            }
            AnalysisVariant::ImageSummary => Ok(AnalysisFields::Image(ImageSummary::new(
                &image,
                frame.len(),
            ))),
        }
    }
}
