//! Detection adapter.
//!
//! [`Detector`] is the seam to the external detection capability. A detector
//! is loaded once at process start, shared as `Arc<dyn Detector>`, and must
//! tolerate concurrent calls through `&self`. The adapter only cares about
//! detections labelled [`PERSON_LABEL`]; all other classes are ignored.

#[cfg(feature = "onnx")]
pub mod onnx;

use std::cmp::Ordering;

use crate::{codec::DecodedImage, error::DetectionError};

/// Label of the class counted by the people-detection variant.
pub const PERSON_LABEL: &str = "person";

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

impl BoundingBox {
    /// Build a box from its centre point and size.
    #[must_use]
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x1: cx - width / 2.0,
            y1: cy - height / 2.0,
            x2: cx + width / 2.0,
            y2: cy + height / 2.0,
        }
    }

    /// Area, zero for degenerate boxes.
    #[must_use]
    pub fn area(&self) -> f32 { (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0) }

    /// Intersection over union with `other`.
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let width = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let height = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = width * height;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }
}

/// One object reported by a detector.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Class label, e.g. `"person"`.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Location of the object.
    pub bbox: BoundingBox,
}

impl Detection {
    /// Create a detection.
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Returns true when the detection is a person.
    #[must_use]
    pub fn is_person(&self) -> bool { self.label == PERSON_LABEL }
}

/// The external detection capability.
///
/// Implementations must not mutate their loaded parameters at runtime. Any
/// internal bookkeeping (counters, scratch buffers, exclusive sessions) is
/// the implementation's own concern.
pub trait Detector: Send + Sync + 'static {
    /// Run detection on `image` once.
    ///
    /// An empty vector means nothing was found and is not a failure.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if inference fails or its output cannot be
    /// interpreted.
    fn detect(&self, image: &DecodedImage) -> Result<Vec<Detection>, DetectionError>;
}

/// Count the detections labelled [`PERSON_LABEL`].
#[must_use]
pub fn count_people(detections: &[Detection]) -> usize {
    detections.iter().filter(|d| d.is_person()).count()
}

/// Greedy class-wise non-maximum suppression.
///
/// Detections are visited in descending confidence order; a detection is
/// dropped when it overlaps an already kept detection of the same label by
/// more than `iou_threshold`.
#[must_use]
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Detector returning the same detections for every image.
///
/// Useful as a smoke-test backend and for exercising the pipeline without a
/// model.
#[derive(Clone, Debug, Default)]
pub struct StaticDetector {
    detections: Vec<Detection>,
}

impl StaticDetector {
    /// Create a detector that always reports `detections`.
    #[must_use]
    pub fn new(detections: Vec<Detection>) -> Self { Self { detections } }

    /// Create a detector that never finds anything.
    #[must_use]
    pub fn empty() -> Self { Self::default() }
}

impl Detector for StaticDetector {
    fn detect(&self, _image: &DecodedImage) -> Result<Vec<Detection>, DetectionError> {
        Ok(self.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, RgbImage};
    use rstest::rstest;

    use super::*;

    fn square(x: f32, y: f32, side: f32) -> BoundingBox {
        BoundingBox {
            x1: x,
            y1: y,
            x2: x + side,
            y2: y + side,
        }
    }

    #[test]
    fn only_people_are_counted() {
        let detections = vec![
            Detection::new("person", 0.9, BoundingBox::default()),
            Detection::new("dog", 0.8, BoundingBox::default()),
            Detection::new("person", 0.4, BoundingBox::default()),
            Detection::new("Person", 0.7, BoundingBox::default()),
        ];
        assert_eq!(count_people(&detections), 2);
    }

    #[test]
    fn no_detections_means_zero_people() {
        assert_eq!(count_people(&[]), 0);
    }

    #[rstest]
    #[case(square(0.0, 0.0, 10.0), square(0.0, 0.0, 10.0), 1.0)]
    #[case(square(0.0, 0.0, 10.0), square(20.0, 20.0, 10.0), 0.0)]
    #[case(square(0.0, 0.0, 10.0), square(5.0, 0.0, 10.0), 50.0 / 150.0)]
    fn iou_matches_geometry(#[case] a: BoundingBox, #[case] b: BoundingBox, #[case] expected: f32) {
        assert!((a.iou(&b) - expected).abs() < 1e-6);
    }

    #[test]
    fn from_center_builds_corners() {
        let bbox = BoundingBox::from_center(10.0, 20.0, 4.0, 6.0);
        assert_eq!(bbox, BoundingBox {
            x1: 8.0,
            y1: 17.0,
            x2: 12.0,
            y2: 23.0
        });
        assert!((bbox.area() - 24.0).abs() < f32::EPSILON);
    }

    #[test]
    fn nms_keeps_highest_confidence_of_overlapping_boxes() {
        let detections = vec![
            Detection::new("person", 0.6, square(1.0, 1.0, 10.0)),
            Detection::new("person", 0.9, square(0.0, 0.0, 10.0)),
            Detection::new("person", 0.8, square(50.0, 50.0, 10.0)),
        ];
        let kept = non_max_suppression(detections, 0.45);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < f32::EPSILON);
        assert!((kept[1].confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn nms_is_class_wise() {
        let detections = vec![
            Detection::new("person", 0.9, square(0.0, 0.0, 10.0)),
            Detection::new("bicycle", 0.8, square(0.0, 0.0, 10.0)),
        ];
        assert_eq!(non_max_suppression(detections, 0.45).len(), 2);
    }

    #[test]
    fn static_detector_repeats_its_detections() {
        let detector = StaticDetector::new(vec![Detection::new("person", 0.9, square(0.0, 0.0, 1.0))]);
        let image = DecodedImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::new(2, 2)));
        for _ in 0..2 {
            let found = detector.detect(&image).expect("detect");
            assert_eq!(count_people(&found), 1);
        }
        assert!(StaticDetector::empty().detect(&image).expect("detect").is_empty());
    }
}
