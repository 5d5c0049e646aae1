//! facetype-core: face metrics and capture result derivation.
//!
//! Turns vision detector output into geometry metrics, runs the SCRFD face
//! detector via ONNX Runtime, and derives the deterministic capture label.

pub mod deriver;
pub mod detector;
pub mod metrics;
pub mod types;

pub use deriver::{HashDeriver, ResultDeriver};
pub use detector::{DetectorError, ScrfdDetector};
pub use metrics::extract_metrics;
pub use types::{
    CaptureResult, DetectedFace, FaceBounds, FaceMetrics, Landmark, LandmarkKind, PersonalityType,
    Point,
};

/// Default directory holding the SCRFD model file.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/facetype/models")
}
