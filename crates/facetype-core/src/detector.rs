//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the anchor-free SCRFD model over an upright grayscale image and
//! returns faces with their five landmarks, sorted by confidence. SCRFD has
//! no smile head, so `smiling_probability` is always `None`.

use crate::types::{DetectedFace, FaceBounds, Landmark, LandmarkKind, Point};
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// Landmark order of the SCRFD keypoint head.
const KEYPOINT_KINDS: [LandmarkKind; 5] = [
    LandmarkKind::LeftEye,
    LandmarkKind::RightEye,
    LandmarkKind::NoseBase,
    LandmarkKind::MouthLeft,
    LandmarkKind::MouthRight,
];

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when fitting the frame into the square input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let (new_w, new_h) = Self::scaled_size(width, height, scale);
        Self {
            scale,
            pad_x: ((INPUT_SIZE - new_w) / 2) as f32,
            pad_y: ((INPUT_SIZE - new_h) / 2) as f32,
        }
    }

    fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
        let w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        let h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
        (w, h)
    }

    /// Map a point in model input space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> Point {
        Point::new((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    session: Session,
    /// (score, bbox, kps) output index per stride.
    outputs: [(usize, usize, usize); 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD needs 9 outputs (score/bbox/kps per stride), model has {}",
                names.len()
            )));
        }

        let outputs = output_layout(&names);
        tracing::info!(path = %model_path.display(), ?outputs, "SCRFD model loaded");

        Ok(Self { session, outputs })
    }

    /// Detect faces in an upright grayscale image.
    pub fn detect(&mut self, image: &GrayImage) -> Result<Vec<DetectedFace>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.outputs[slot];
            let tensor = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let heads = StrideHeads {
                scores: tensor(score_idx, "scores")?,
                boxes: tensor(bbox_idx, "boxes")?,
                keypoints: tensor(kps_idx, "keypoints")?,
            };
            candidates.extend(heads.decode(stride, &letterbox));
        }

        Ok(non_max_suppression(candidates, NMS_IOU_THRESHOLD))
    }
}

/// Resolve output tensor indices, preferring `score_8`-style names over position.
fn output_layout(names: &[String]) -> [(usize, usize, usize); 3] {
    let find = |head: &str, stride: usize| {
        let wanted = format!("{head}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let mut layout = [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
    for (slot, &stride) in STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(s), Some(b), Some(k)) => layout[slot] = (s, b, k),
            _ => {
                tracing::debug!(?names, "SCRFD output names not recognised, using positional layout");
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    layout
}

/// Letterbox the image into a normalised 1x3xNxN tensor.
fn preprocess(image: &GrayImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height());
    let (new_w, new_h) = Letterbox::scaled_size(image.width(), image.height(), letterbox.scale);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let size = INPUT_SIZE as usize;
    // Zero is the normalised value of PIXEL_MEAN, so padding stays neutral.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let (off_x, off_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);

    for (x, y, pixel) in resized.enumerate_pixels() {
        let value = (pixel.0[0] as f32 - PIXEL_MEAN) / PIXEL_STD;
        let (tx, ty) = (x as usize + off_x, y as usize + off_y);
        for channel in 0..3 {
            tensor[[0, channel, ty, tx]] = value;
        }
    }

    (tensor, letterbox)
}

/// Raw head outputs for one stride.
struct StrideHeads<'a> {
    scores: &'a [f32],
    boxes: &'a [f32],
    keypoints: &'a [f32],
}

impl StrideHeads<'_> {
    fn decode(&self, stride: usize, letterbox: &Letterbox) -> Vec<DetectedFace> {
        let cells = INPUT_SIZE as usize / stride;
        let step = stride as f32;
        let mut faces = Vec::new();

        for anchor in 0..cells * cells * ANCHORS_PER_CELL {
            let score = self.scores.get(anchor).copied().unwrap_or(0.0);
            if score <= SCORE_THRESHOLD {
                continue;
            }
            let Some(dist) = self.boxes.get(anchor * 4..anchor * 4 + 4) else {
                continue;
            };

            let cell = anchor / ANCHORS_PER_CELL;
            let cx = (cell % cells) as f32 * step;
            let cy = (cell / cells) as f32 * step;

            let top_left = letterbox.unmap(cx - dist[0] * step, cy - dist[1] * step);
            let bottom_right = letterbox.unmap(cx + dist[2] * step, cy + dist[3] * step);

            let landmarks = self
                .keypoints
                .get(anchor * 10..anchor * 10 + 10)
                .map(|kps| {
                    KEYPOINT_KINDS
                        .iter()
                        .zip(kps.chunks_exact(2))
                        .map(|(&kind, xy)| Landmark {
                            kind,
                            position: letterbox.unmap(cx + xy[0] * step, cy + xy[1] * step),
                        })
                        .collect()
                })
                .unwrap_or_default();

            faces.push(DetectedFace {
                bounds: FaceBounds {
                    x: top_left.x,
                    y: top_left.y,
                    width: bottom_right.x - top_left.x,
                    height: bottom_right.y - top_left.y,
                },
                confidence: score,
                landmarks,
                smiling_probability: None,
            });
        }

        faces
    }
}

/// Greedy NMS; output is sorted by descending confidence.
fn non_max_suppression(mut faces: Vec<DetectedFace>, iou_threshold: f32) -> Vec<DetectedFace> {
    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<DetectedFace> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept.iter().all(|k| iou(&k.bounds, &face.bounds) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}

fn iou(a: &FaceBounds, b: &FaceBounds) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
