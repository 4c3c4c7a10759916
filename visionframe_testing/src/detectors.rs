//! Stub detection backends.

use visionframe::{
    codec::DecodedImage,
    detect::{BoundingBox, Detection, Detector, StaticDetector},
    error::DetectionError,
};

/// Detector whose every call fails with [`DetectionError::Inference`].
#[derive(Clone, Debug)]
pub struct FailingDetector(pub &'static str);

impl Detector for FailingDetector {
    fn detect(&self, _image: &DecodedImage) -> Result<Vec<Detection>, DetectionError> {
        Err(DetectionError::Inference(self.0.to_owned()))
    }
}

/// Detector that panics with the given message.
#[derive(Clone, Debug)]
pub struct PanickingDetector(pub &'static str);

impl Detector for PanickingDetector {
    fn detect(&self, _image: &DecodedImage) -> Result<Vec<Detection>, DetectionError> {
        panic!("{}", self.0)
    }
}

/// A [`StaticDetector`] reporting `count` people and one unrelated object.
#[must_use]
pub fn people(count: usize) -> StaticDetector {
    let mut detections: Vec<Detection> = (0..count)
        .map(|_| Detection::new("person", 0.9, BoundingBox::default()))
        .collect();
    detections.push(Detection::new("bicycle", 0.8, BoundingBox::default()));
    StaticDetector::new(detections)
}
