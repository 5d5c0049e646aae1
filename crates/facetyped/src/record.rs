use chrono::{DateTime, Utc};
use facetype_core::CaptureResult;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// An encoded still owned by the capture subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedImage {
    /// Stable key the result is derived from (the shot file name).
    pub identity: String,
    pub path: PathBuf,
}

/// Outcome of one completed capture. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    /// Referenced only; the file belongs to the capture subsystem.
    pub image: EncodedImage,
    pub result: CaptureResult,
    /// Monotonic; not serialized.
    #[serde(skip)]
    pub captured_at: Instant,
    pub recorded_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(image: EncodedImage, result: CaptureResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            result,
            captured_at: Instant::now(),
            recorded_at: Utc::now(),
        }
    }
}

impl PartialEq for AnalysisRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
