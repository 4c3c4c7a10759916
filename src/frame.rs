//! Inbound frame decoding.
//!
//! A client sends each image as one text message in one of two shapes:
//!
//! - a data URL, `data:image/<subtype>;base64,<payload>`, split on the first `,`;
//! - a bare base64 string, decoded as a whole.
//!
//! The data-URL header is only used to record the declared media type. When a
//! bare payload arrives the media type is inferred from the decoded bytes.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;

use crate::error::FrameError;

/// Prefix identifying the data-URL form of a frame.
pub const DATA_URL_PREFIX: &str = "data:";

/// How a frame's media type was determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaSource {
    /// Taken from the data-URL header.
    Declared,
    /// Guessed from the decoded bytes' magic number.
    Inferred,
}

/// A single decoded inbound frame.
///
/// Frames live for one pipeline iteration and are dropped once the response
/// has been produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
    media_type: Option<(String, MediaSource)>,
    payload_chars: usize,
}

impl Frame {
    /// Decode a transport text message into raw image bytes.
    ///
    /// ```
    /// use visionframe::frame::Frame;
    ///
    /// let frame = Frame::decode("data:image/png;base64,aGVsbG8=").expect("valid frame");
    /// assert_eq!(frame.bytes().as_ref(), b"hello");
    /// assert_eq!(frame.media_type(), Some("image/png"));
    ///
    /// assert!(Frame::decode("not base64!").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Empty`] for an empty message or payload,
    /// [`FrameError::MissingSeparator`] for a data URL without `,`, and
    /// [`FrameError::Base64`] when the payload is not valid base64.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FrameError::Empty);
        }

        let (declared, payload) = match text.strip_prefix(DATA_URL_PREFIX) {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or(FrameError::MissingSeparator)?;
                (declared_media_type(header), payload)
            }
            None => (None, text),
        };

        let bytes = decode_base64(payload)?;
        if bytes.is_empty() {
            return Err(FrameError::Empty);
        }

        let media_type = declared
            .map(|mime| (mime, MediaSource::Declared))
            .or_else(|| {
                image::guess_format(&bytes)
                    .ok()
                    .map(|format| (format.to_mime_type().to_owned(), MediaSource::Inferred))
            });

        Ok(Self {
            bytes: Bytes::from(bytes),
            media_type,
            payload_chars: text.chars().count(),
        })
    }

    /// Raw image bytes carried by the frame.
    #[must_use]
    pub fn bytes(&self) -> &Bytes { &self.bytes }

    /// Decoded byte length.
    #[must_use]
    pub fn len(&self) -> usize { self.bytes.len() }

    /// Always false for a successfully decoded frame.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Declared or inferred media type, e.g. `image/png`.
    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_ref().map(|(mime, _)| mime.as_str())
    }

    /// Whether the media type came from the header or from the bytes.
    #[must_use]
    pub fn media_source(&self) -> Option<MediaSource> {
        self.media_type.as_ref().map(|(_, source)| *source)
    }

    /// Length of the transport message in characters.
    #[must_use]
    pub fn payload_chars(&self) -> usize { self.payload_chars }
}

/// Extract `image/png` from a header such as `image/png;base64`.
fn declared_media_type(header: &str) -> Option<String> {
    header
        .split(';')
        .next()
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_owned)
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, FrameError> {
    // Line-wrapped encoders insert whitespace the standard engine rejects.
    if payload.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        return Ok(STANDARD.decode(compact)?);
    }
    Ok(STANDARD.decode(payload)?)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn data_url_yields_declared_media_type() {
        let frame = Frame::decode("data:image/jpeg;base64,aGVsbG8=").expect("decode");
        assert_eq!(frame.bytes().as_ref(), b"hello");
        assert_eq!(frame.media_type(), Some("image/jpeg"));
        assert_eq!(frame.media_source(), Some(MediaSource::Declared));
        assert_eq!(frame.len(), 5);
    }

    #[test]
    fn bare_payload_infers_media_type_from_magic() {
        let encoded = STANDARD.encode(PNG_MAGIC);
        let frame = Frame::decode(&encoded).expect("decode");
        assert_eq!(frame.bytes().as_ref(), PNG_MAGIC);
        assert_eq!(frame.media_type(), Some("image/png"));
        assert_eq!(frame.media_source(), Some(MediaSource::Inferred));
    }

    #[test]
    fn bare_payload_of_unknown_bytes_has_no_media_type() {
        let frame = Frame::decode("aGVsbG8=").expect("decode");
        assert_eq!(frame.media_type(), None);
        assert_eq!(frame.payload_chars(), 8);
    }

    #[test]
    fn only_first_comma_separates_header() {
        // Commas are outside the base64 alphabet, so the payload is rejected.
        let err = Frame::decode("data:image/png;base64,aGVs,bG8=").expect_err("must fail");
        assert!(matches!(err, FrameError::Base64(_)));
    }

    #[test]
    fn wrapped_payload_is_accepted() {
        let frame = Frame::decode("data:image/png;base64,aGVs\nbG8=\n").expect("decode");
        assert_eq!(frame.bytes().as_ref(), b"hello");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("data:image/png;base64,")]
    fn empty_frames_are_rejected(#[case] text: &str) {
        assert!(matches!(Frame::decode(text), Err(FrameError::Empty)));
    }

    #[test]
    fn data_url_without_separator_is_rejected() {
        assert!(matches!(
            Frame::decode("data:image/png;base64"),
            Err(FrameError::MissingSeparator)
        ));
    }

    #[rstest]
    #[case("aGVsbG8")]
    #[case("@@@@")]
    #[case("data:image/png;base64,****")]
    fn malformed_base64_is_rejected(#[case] text: &str) {
        assert!(matches!(Frame::decode(text), Err(FrameError::Base64(_))));
    }

    #[test]
    fn header_without_mime_falls_back_to_inference() {
        let encoded = STANDARD.encode(PNG_MAGIC);
        let frame = Frame::decode(&format!("data:;base64,{encoded}")).expect("decode");
        assert_eq!(frame.media_source(), Some(MediaSource::Inferred));
    }
}
