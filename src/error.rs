//! Canonical error types for the frame pipeline.
//!
//! Each pipeline stage reports failures through its own enum so callers can
//! tell a malformed payload from an unreadable image or a failing detector.
//! The first three categories are recovered inside the connection loop and
//! surfaced to the client as an `error` field; only [`TransportError`] ends a
//! connection.
//!
//! # Error Categories
//!
//! - [`FrameError`]: the text payload is empty, or its base64 body does not decode.
//! - [`ImageDecodeError`]: the decoded bytes are not a readable image.
//! - [`DetectionError`]: the detection capability failed or returned malformed output.
//! - [`TransportError`]: the WebSocket handshake, a receive, or a send failed.

use std::{fmt, io};

use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, error::ProtocolError};

/// Stable tag naming the category of a pipeline failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed base64 or data-URL container.
    Decode,
    /// Bytes that do not decode as an image.
    ImageDecode,
    /// Failure raised by the detection capability.
    Detection,
    /// Connection-level failure.
    Transport,
    /// Unexpected failure inside the receive loop (panic, unsupported frame).
    Processing,
}

impl ErrorKind {
    /// Tag used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "DecodeError",
            Self::ImageDecode => "ImageDecodeError",
            Self::Detection => "DetectionError",
            Self::Transport => "TransportError",
            Self::Processing => "ProcessingError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Errors raised while turning a text message into raw image bytes.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The message, or the payload after the data-URL header, was empty.
    #[error("empty frame")]
    Empty,

    /// A `data:` message had no `,` separating the header from the payload.
    #[error("data URL is missing the ',' payload separator")]
    MissingSeparator,

    /// The payload is not valid standard base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Errors raised by the image codec adapter.
#[derive(Debug, Error)]
pub enum ImageDecodeError {
    /// Zero bytes were handed to the codec.
    #[error("failed to decode image: no image data")]
    Empty,

    /// The codec rejected the bytes (unknown format, truncated data, ...).
    #[error("failed to decode image: {0}")]
    Codec(#[from] image::ImageError),
}

/// Errors raised by the detection capability.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The capability could not be loaded.
    #[error("detector failed to load: {0}")]
    Load(String),

    /// Inference raised an error.
    #[error("detection failed: {0}")]
    Inference(String),

    /// Inference succeeded but produced output the adapter cannot interpret.
    #[error("detection failed: malformed output: {0}")]
    MalformedOutput(String),
}

/// Any recoverable failure from a single frame's analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Frame decoding failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Image decoding failed.
    #[error(transparent)]
    Image(#[from] ImageDecodeError),
    /// Detection failed.
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

impl AnalysisError {
    /// Category tag for this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Frame(_) => ErrorKind::Decode,
            Self::Image(_) => ErrorKind::ImageDecode,
            Self::Detection(_) => ErrorKind::Detection,
        }
    }
}

/// Connection-level failures. These terminate the affected connection only.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The WebSocket upgrade did not complete.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),

    /// The WebSocket upgrade did not complete in time.
    #[error("websocket handshake timed out")]
    HandshakeTimeout,

    /// Reading the next inbound message failed.
    #[error("receive failed: {0}")]
    Receive(#[source] tungstenite::Error),

    /// Writing an outbound message failed.
    #[error("send failed: {0}")]
    Send(#[source] tungstenite::Error),
}

impl TransportError {
    /// Category tag, always [`ErrorKind::Transport`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind { ErrorKind::Transport }

    /// Returns true when the error only means the peer went away.
    ///
    /// A disconnect is an ordinary end of stream and is not reported as a
    /// failure to the accept loop.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Receive(error) | Self::Send(error) => is_disconnect(error),
            Self::Handshake(_) | Self::HandshakeTimeout => false,
        }
    }
}

fn is_disconnect(error: &tungstenite::Error) -> bool {
    match error {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        tungstenite::Error::Io(io_error) => matches!(
            io_error.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}
