//! Synthetic image fixtures.

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format)
        .expect("in-memory image encoding cannot fail");
    buf.into_inner()
}

/// A single-colour RGB PNG.
#[must_use]
pub fn solid_png(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    encode(
        &DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(colour))),
        ImageFormat::Png,
    )
}

/// A single-colour RGB JPEG.
#[must_use]
pub fn solid_jpeg(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    encode(
        &DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(colour))),
        ImageFormat::Jpeg,
    )
}

/// A mid-grey single-channel PNG.
#[must_use]
pub fn gray_png(width: u32, height: u32) -> Vec<u8> {
    encode(
        &DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([128]))),
        ImageFormat::Png,
    )
}

/// `data:<mime>;base64,<bytes>`.
#[must_use]
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Data URL of a black `width` x `height` PNG.
#[must_use]
pub fn png_data_url(width: u32, height: u32) -> String {
    data_url("image/png", &solid_png(width, height, [0, 0, 0]))
}
