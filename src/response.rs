//! Response encoder.
//!
//! Every outbound message is a JSON object whose `type` field is one of
//! `connection`, `image_analysis` or `error`. Analysis failures travel inside
//! the `image_analysis` envelope with an `error` field; only unexpected
//! in-loop failures use the `error` envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisFields, AnalysisOutcome, AnalysisVariant};

/// Text of the greeting sent once after the upgrade completes.
pub const GREETING: &str = "Connected to image stream server";

/// Prefix of the message carried by the `error` envelope.
pub const PROCESSING_ERROR_PREFIX: &str = "Processing error";

/// Sent if serialisation itself fails, which only happens on a bug.
const ENCODE_FALLBACK: &str =
    r#"{"type":"error","message":"Processing error: failed to encode response"}"#;

/// Outbound message envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Greeting; exactly one per connection, always first.
    Connection {
        /// Human-readable greeting.
        message: String,
    },
    /// Result of analysing one inbound frame.
    ImageAnalysis {
        /// Analysis fields, or the failure absorbed into them.
        data: AnalysisPayload,
    },
    /// Unexpected in-loop failure; the connection stays open.
    Error {
        /// Human-readable description.
        message: String,
    },
}

/// Body of an `image_analysis` message.
///
/// The shape depends on the configured analysis: the detection variant always
/// carries `people_count` and the summary variant always carries `success`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisPayload {
    /// Detection result; `people_count` is 0 whenever `error` is set.
    People {
        /// Number of people found.
        people_count: usize,
        /// Stage failure, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Successful image summary.
    Image {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Channel count.
        channels: u8,
        /// `"BGR"` or `"GRAY"`.
        format: String,
        /// Decoded byte length.
        size_bytes: usize,
        /// Always true.
        success: bool,
    },
    /// Failed image summary.
    Failed {
        /// Stage failure.
        error: String,
        /// Always false.
        success: bool,
    },
}

impl AnalysisPayload {
    /// The embedded failure message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::People { error, .. } => error.as_deref(),
            Self::Image { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}

/// Which payload shape a pipeline emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    /// `{people_count, error?}`.
    People,
    /// `{width, height, ...}` or `{error, success: false}`.
    ImageSummary,
}

impl From<&AnalysisVariant> for PayloadShape {
    fn from(variant: &AnalysisVariant) -> Self {
        match variant {
            AnalysisVariant::PeopleDetection(_) => Self::People,
            AnalysisVariant::ImageSummary => Self::ImageSummary,
        }
    }
}

impl WireMessage {
    /// The greeting message.
    #[must_use]
    pub fn greeting() -> Self {
        Self::Connection {
            message: GREETING.to_owned(),
        }
    }

    /// Wrap `outcome` in an `image_analysis` envelope of the given shape.
    #[must_use]
    pub fn analysis(shape: PayloadShape, outcome: &AnalysisOutcome) -> Self {
        let data = match (shape, outcome) {
            (_, AnalysisOutcome::Success(AnalysisFields::People { people_count })) => {
                AnalysisPayload::People {
                    people_count: *people_count,
                    error: None,
                }
            }
            (_, AnalysisOutcome::Success(AnalysisFields::Image(summary))) => {
                AnalysisPayload::Image {
                    width: summary.width,
                    height: summary.height,
                    channels: summary.channels,
                    format: summary.format.to_owned(),
                    size_bytes: summary.size_bytes,
                    success: true,
                }
            }
            (PayloadShape::People, AnalysisOutcome::Failure(error)) => AnalysisPayload::People {
                people_count: 0,
                error: Some(error.to_string()),
            },
            (PayloadShape::ImageSummary, AnalysisOutcome::Failure(error)) => {
                AnalysisPayload::Failed {
                    error: error.to_string(),
                    success: false,
                }
            }
        };
        Self::ImageAnalysis { data }
    }

    /// An `error` envelope reading `Processing error: <error>`.
    #[must_use]
    pub fn processing_error(error: impl fmt::Display) -> Self {
        Self::Error {
            message: format!("{PROCESSING_ERROR_PREFIX}: {error}"),
        }
    }

    /// Value of the `type` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::ImageAnalysis { .. } => "image_analysis",
            Self::Error { .. } => "error",
        }
    }

    /// Serialise to the JSON text sent on the wire.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::error!("failed to encode {} message: {e}", self.kind());
            ENCODE_FALLBACK.to_owned()
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        analysis::ImageSummary,
        error::{AnalysisError, FrameError},
    };

    fn as_json(message: &WireMessage) -> Value {
        serde_json::from_str(&message.encode()).expect("valid json")
    }

    fn failure() -> AnalysisOutcome { AnalysisOutcome::Failure(AnalysisError::from(FrameError::Empty)) }

    #[test]
    fn greeting_matches_wire_format() {
        assert_eq!(
            as_json(&WireMessage::greeting()),
            json!({"type": "connection", "message": "Connected to image stream server"})
        );
    }

    #[test]
    fn people_success_omits_error() {
        let outcome = AnalysisOutcome::Success(AnalysisFields::People { people_count: 3 });
        assert_eq!(
            as_json(&WireMessage::analysis(PayloadShape::People, &outcome)),
            json!({"type": "image_analysis", "data": {"people_count": 3}})
        );
    }

    #[test]
    fn people_failure_is_absorbed_with_zero_count() {
        let message = WireMessage::analysis(PayloadShape::People, &failure());
        assert_eq!(
            as_json(&message),
            json!({"type": "image_analysis", "data": {"people_count": 0, "error": "empty frame"}})
        );
    }

    #[test]
    fn summary_success_reports_all_fields() {
        let outcome = AnalysisOutcome::Success(AnalysisFields::Image(ImageSummary {
            width: 640,
            height: 480,
            channels: 3,
            format: "BGR",
            size_bytes: 1234,
        }));
        assert_eq!(
            as_json(&WireMessage::analysis(PayloadShape::ImageSummary, &outcome)),
            json!({
                "type": "image_analysis",
                "data": {
                    "width": 640,
                    "height": 480,
                    "channels": 3,
                    "format": "BGR",
                    "size_bytes": 1234,
                    "success": true
                }
            })
        );
    }

    #[test]
    fn summary_failure_sets_success_false() {
        let message = WireMessage::analysis(PayloadShape::ImageSummary, &failure());
        assert_eq!(
            as_json(&message),
            json!({"type": "image_analysis", "data": {"error": "empty frame", "success": false}})
        );
    }

    #[test]
    fn processing_error_is_prefixed() {
        assert_eq!(
            as_json(&WireMessage::processing_error("boom")),
            json!({"type": "error", "message": "Processing error: boom"})
        );
    }

    #[rstest]
    #[case(r#"{"type":"connection","message":"hi"}"#, "connection")]
    #[case(r#"{"type":"image_analysis","data":{"people_count":1}}"#, "image_analysis")]
    #[case(r#"{"type":"image_analysis","data":{"error":"x","success":false}}"#, "image_analysis")]
    #[case(r#"{"type":"error","message":"Processing error: x"}"#, "error")]
    fn client_side_parsing_recovers_type(#[case] text: &str, #[case] kind: &str) {
        let message: WireMessage = serde_json::from_str(text).expect("parse");
        assert_eq!(message.kind(), kind);
    }

    #[test]
    fn payload_error_accessor() {
        let WireMessage::ImageAnalysis { data } =
            WireMessage::analysis(PayloadShape::ImageSummary, &failure())
        else {
            panic!("expected image_analysis");
        };
        assert_eq!(data.error(), Some("empty frame"));
    }
}
