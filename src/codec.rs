//! Image codec adapter.
//!
//! Wraps the `image` crate behind a single stateless function. Colour images
//! are normalised to 8-bit three-channel pixels and greyscale images to 8-bit
//! single-channel pixels, so downstream stages only ever see those two
//! layouts.

use image::DynamicImage;

use crate::error::ImageDecodeError;

/// Format label reported for three-channel images.
pub const FORMAT_COLOR: &str = "BGR";
/// Format label reported for single-channel images.
pub const FORMAT_GRAY: &str = "GRAY";

/// A decoded pixel grid.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    channels: u8,
    pixels: DynamicImage,
}

impl DecodedImage {
    /// Wrap an already decoded image, normalising its pixel layout.
    #[must_use]
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let pixels = if image.color().has_color() {
            DynamicImage::ImageRgb8(image.into_rgb8())
        } else {
            DynamicImage::ImageLuma8(image.into_luma8())
        };
        let channels = pixels.color().channel_count();
        Self {
            width: pixels.width(),
            height: pixels.height(),
            channels,
            pixels,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 { self.width }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 { self.height }

    /// Channel count: 3 for colour, 1 for greyscale.
    #[must_use]
    pub fn channels(&self) -> u8 { self.channels }

    /// `"BGR"` for three channels, `"GRAY"` otherwise.
    #[must_use]
    pub fn format_label(&self) -> &'static str {
        if self.channels == 3 { FORMAT_COLOR } else { FORMAT_GRAY }
    }

    /// Pixel data handle.
    #[must_use]
    pub fn pixels(&self) -> &DynamicImage { &self.pixels }
}

/// Decode raw bytes into a [`DecodedImage`].
///
/// The format is detected from the bytes themselves. The input slice is only
/// read.
///
/// # Errors
///
/// Returns [`ImageDecodeError::Empty`] for zero bytes and
/// [`ImageDecodeError::Codec`] for unrecognised or truncated data.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    Ok(DecodedImage::from_dynamic(image))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, RgbaImage};
    use rstest::rstest;

    use super::*;

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).expect("encode test image");
        buf.into_inner()
    }

    #[rstest]
    #[case(ImageFormat::Png)]
    #[case(ImageFormat::Jpeg)]
    #[case(ImageFormat::Bmp)]
    fn colour_images_decode_to_three_channels(#[case] format: ImageFormat) {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([200, 10, 10])));
        let decoded = decode_image(&encode(&source, format)).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        assert_eq!(decoded.channels(), 3);
        assert_eq!(decoded.format_label(), "BGR");
    }

    #[test]
    fn greyscale_png_decodes_to_one_channel() {
        let source = DynamicImage::ImageLuma8(GrayImage::from_pixel(7, 5, Luma([128])));
        let decoded = decode_image(&encode(&source, ImageFormat::Png)).expect("decode");
        assert_eq!(decoded.channels(), 1);
        assert_eq!(decoded.format_label(), "GRAY");
        assert_eq!(decoded.pixels().width(), 7);
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let source = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        let decoded = decode_image(&encode(&source, ImageFormat::Png)).expect("decode");
        assert_eq!(decoded.channels(), 3);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(decode_image(&[]), Err(ImageDecodeError::Empty)));
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(ImageDecodeError::Codec(_))
        ));
    }

    #[test]
    fn truncated_png_is_rejected() {
        let source = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let bytes = encode(&source, ImageFormat::Png);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(decode_image(truncated).is_err());
    }

    #[test]
    fn input_buffer_is_left_untouched() {
        let source = DynamicImage::ImageRgb8(RgbImage::new(3, 3));
        let bytes = encode(&source, ImageFormat::Png);
        let copy = bytes.clone();
        decode_image(&bytes).expect("decode");
        assert_eq!(bytes, copy);
    }
}
