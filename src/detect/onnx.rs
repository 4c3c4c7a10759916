//! YOLOv8 person detector backed by ONNX Runtime (feature-gated behind `onnx`).
//!
//! Expects a standard Ultralytics export: one `[1, 3, 640, 640]` float input
//! in RGB order scaled to `[0, 1]`, and one `[1, 4 + classes, anchors]`
//! output whose first four rows are `cx, cy, w, h` in input pixels.

use std::path::Path;

use image::imageops::FilterType;
use ort::{session::Session, value::Tensor};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{BoundingBox, Detection, Detector, PERSON_LABEL, non_max_suppression};
use crate::{codec::DecodedImage, error::DetectionError};

/// Square input edge expected by the model.
pub const INPUT_SIZE: u32 = 640;

/// COCO class index for people.
const PERSON_CLASS: usize = 0;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Thresholds applied to raw model output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OnnxDetectorConfig {
    /// Minimum class score for a candidate to be kept.
    pub confidence: f32,
    /// IoU above which overlapping candidates of one class are suppressed.
    pub iou: f32,
    /// Intra-op threads used by the runtime.
    pub intra_threads: usize,
}

impl Default for OnnxDetectorConfig {
    fn default() -> Self {
        Self {
            confidence: 0.25,
            iou: 0.45,
            intra_threads: 2,
        }
    }
}

/// YOLOv8 detector loaded from an `.onnx` file.
///
/// The runtime session needs exclusive access per run, so it lives behind a
/// mutex; the weights themselves are never modified after load.
pub struct OnnxPersonDetector {
    session: Mutex<Session>,
    config: OnnxDetectorConfig,
}

impl std::fmt::Debug for OnnxPersonDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPersonDetector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OnnxPersonDetector {
    /// Load the model at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::Load`] if the runtime cannot build a session
    /// from the file.
    pub fn load(path: impl AsRef<Path>, config: OnnxDetectorConfig) -> Result<Self, DetectionError> {
        let path = path.as_ref();
        let session = build_session(path, config.intra_threads)
            .map_err(|e| DetectionError::Load(format!("{}: {e}", path.display())))?;
        info!(model = %path.display(), ?config, "ONNX detector loaded");
        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    /// Thresholds in use.
    #[must_use]
    pub fn config(&self) -> OnnxDetectorConfig { self.config }

    fn run(&self, image: &DecodedImage) -> Result<Vec<Detection>, BoxError> {
        let input = preprocess(image);
        let side = i64::from(INPUT_SIZE);
        let tensor = Tensor::from_array((vec![1_i64, 3, side, side], input))?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        let scale_x = image.width() as f32 / INPUT_SIZE as f32;
        let scale_y = image.height() as f32 / INPUT_SIZE as f32;
        let candidates = decode_output(&dims, data, self.config.confidence, (scale_x, scale_y))?;
        Ok(non_max_suppression(candidates, self.config.iou))
    }
}

impl Detector for OnnxPersonDetector {
    fn detect(&self, image: &DecodedImage) -> Result<Vec<Detection>, DetectionError> {
        let detections = self.run(image).map_err(|e| match e.downcast::<DetectionError>() {
            Ok(error) => *error,
            Err(other) => DetectionError::Inference(other.to_string()),
        })?;
        debug!(count = detections.len(), "ONNX detector finished");
        Ok(detections)
    }
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session, BoxError> {
    let session = Session::builder()?
        .with_intra_threads(intra_threads)?
        .commit_from_file(path)?;
    Ok(session)
}

/// Resize to the model input and lay the pixels out as planar RGB floats.
fn preprocess(image: &DecodedImage) -> Vec<f32> {
    let resized = image
        .pixels()
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .into_rgb8();
    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut input = vec![0.0_f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y * INPUT_SIZE + x) as usize;
        for (channel, value) in pixel.0.iter().enumerate() {
            input[channel * plane + offset] = f32::from(*value) / 255.0;
        }
    }
    input
}

fn class_label(class: usize) -> String {
    if class == PERSON_CLASS {
        PERSON_LABEL.to_owned()
    } else {
        format!("class_{class}")
    }
}

/// Turn a `[1, 4 + classes, anchors]` tensor into scored candidates.
fn decode_output(
    dims: &[usize],
    data: &[f32],
    confidence: f32,
    (scale_x, scale_y): (f32, f32),
) -> Result<Vec<Detection>, DetectionError> {
    let [batch, rows, anchors] = dims else {
        return Err(DetectionError::MalformedOutput(format!(
            "expected a rank-3 output, got shape {dims:?}"
        )));
    };
    if *batch != 1 || *rows <= 4 || data.len() != rows * anchors {
        return Err(DetectionError::MalformedOutput(format!(
            "unexpected output shape {dims:?} for {} values",
            data.len()
        )));
    }

    let at = |row: usize, anchor: usize| data[row * anchors + anchor];
    let mut candidates = Vec::new();
    for anchor in 0..*anchors {
        let best = (4..*rows)
            .map(|row| (row - 4, at(row, anchor)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((class, score)) = best else { continue };
        if score < confidence {
            continue;
        }
        let bbox = BoundingBox::from_center(
            at(0, anchor) * scale_x,
            at(1, anchor) * scale_y,
            at(2, anchor) * scale_x,
            at(3, anchor) * scale_y,
        );
        candidates.push(Detection::new(class_label(class), score, bbox));
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[1, 6, anchors]` tensor with two classes.
    fn tensor(anchors: &[[f32; 6]]) -> (Vec<usize>, Vec<f32>) {
        let n = anchors.len();
        let mut data = vec![0.0; 6 * n];
        for (a, values) in anchors.iter().enumerate() {
            for (row, value) in values.iter().enumerate() {
                data[row * n + a] = *value;
            }
        }
        (vec![1, 6, n], data)
    }

    #[test]
    fn candidates_below_confidence_are_dropped() {
        let (dims, data) = tensor(&[
            [100.0, 100.0, 20.0, 40.0, 0.9, 0.1],
            [300.0, 300.0, 20.0, 40.0, 0.1, 0.2],
        ]);
        let found = decode_output(&dims, &data, 0.25, (1.0, 1.0)).expect("decode");
        assert_eq!(found.len(), 1);
        assert!(found[0].is_person());
    }

    #[test]
    fn best_class_wins_and_boxes_are_scaled() {
        let (dims, data) = tensor(&[[320.0, 320.0, 64.0, 64.0, 0.3, 0.8]]);
        let found = decode_output(&dims, &data, 0.25, (2.0, 0.5)).expect("decode");
        assert_eq!(found[0].label, "class_1");
        assert!((found[0].bbox.x1 - 576.0).abs() < 1e-3);
        assert!((found[0].bbox.y2 - 176.0).abs() < 1e-3);
    }

    #[test]
    fn malformed_shapes_are_reported() {
        assert!(matches!(
            decode_output(&[1, 84], &[0.0; 84], 0.25, (1.0, 1.0)),
            Err(DetectionError::MalformedOutput(_))
        ));
        assert!(matches!(
            decode_output(&[1, 6, 3], &[0.0; 6], 0.25, (1.0, 1.0)),
            Err(DetectionError::MalformedOutput(_))
        ));
    }
}
