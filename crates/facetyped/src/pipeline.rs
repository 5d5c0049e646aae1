//! Live frame analysis with at most one detector pass in flight.
//!
//! The camera thread pushes every frame into [`FrameAnalysisPipeline::on_frame`].
//! While an analysis is running, new frames are released immediately instead
//! of queued: there is no backlog, so a slow detector sheds load rather than
//! falling behind the live preview. Only the latest metrics are kept.

use facetype_core::{extract_metrics, DetectedFace, DetectorError, FaceMetrics};
use facetype_hw::Frame;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Asynchronous face detector consulted once per analysed frame.
pub trait VisionDetector: Send + Sync + 'static {
    fn detect(
        &self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Vec<DetectedFace>, DetectorError>> + Send;
}

/// What `on_frame` did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Claimed for analysis; released when the analysis finishes.
    Dispatched,
    /// Released immediately because an analysis was in flight.
    Dropped,
}

/// Counters since pipeline start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// An analysis is in flight.
    pub busy: bool,
    pub analyzed: u64,
    pub dropped: u64,
    pub failed: u64,
    pub timed_out: u64,
}

struct Shared<D> {
    detector: D,
    busy: AtomicBool,
    latest: watch::Sender<Option<FaceMetrics>>,
    analysis_timeout: Duration,
    analyzed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Clone-safe handle to the analysis pipeline.
pub struct FrameAnalysisPipeline<D> {
    shared: Arc<Shared<D>>,
    runtime: Handle,
}

impl<D> Clone for FrameAnalysisPipeline<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            runtime: self.runtime.clone(),
        }
    }
}

impl<D: VisionDetector> FrameAnalysisPipeline<D> {
    /// Build a pipeline whose analyses run on `runtime`.
    pub fn new(detector: D, analysis_timeout: Duration, runtime: Handle) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                detector,
                busy: AtomicBool::new(false),
                latest,
                analysis_timeout,
                analyzed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                timed_out: AtomicU64::new(0),
            }),
            runtime,
        }
    }

    /// Offer a frame for analysis. Never blocks.
    pub fn on_frame(&self, frame: Frame) -> FrameDisposition {
        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(seq = frame.sequence, "analysis in flight, frame dropped");
            return FrameDisposition::Dropped;
        }

        let lease = AnalysisLease {
            shared: Arc::clone(&self.shared),
            frame: Some(frame),
        };
        // If the runtime is shutting down the future is dropped unpolled,
        // which still releases the lease.
        self.runtime.spawn(lease.run());
        FrameDisposition::Dispatched
    }

    /// Receiver for the most recently published metrics.
    pub fn subscribe(&self) -> watch::Receiver<Option<FaceMetrics>> {
        self.shared.latest.subscribe()
    }

    pub fn latest(&self) -> Option<FaceMetrics> {
        *self.shared.latest.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            busy: self.is_busy(),
            analyzed: self.shared.analyzed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            timed_out: self.shared.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Ownership of the busy flag and the claimed frame for one analysis.
///
/// Dropping the lease clears the flag and then releases the frame, on every
/// exit path including task cancellation.
struct AnalysisLease<D> {
    shared: Arc<Shared<D>>,
    frame: Option<Frame>,
}

impl<D: VisionDetector> AnalysisLease<D> {
    async fn run(self) {
        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        let shared = &self.shared;

        let detection = tokio::time::timeout(shared.analysis_timeout, shared.detector.detect(frame)).await;
        let metrics = match detection {
            Ok(Ok(faces)) => {
                shared.analyzed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(seq = frame.sequence, faces = faces.len(), "frame analysed");
                extract_metrics(&faces)
            }
            Ok(Err(e)) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(seq = frame.sequence, error = %e, "detector failed, publishing no metrics");
                None
            }
            Err(_) => {
                shared.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    seq = frame.sequence,
                    timeout_ms = shared.analysis_timeout.as_millis() as u64,
                    "detector timed out, publishing no metrics"
                );
                None
            }
        };

        shared.latest.send_replace(metrics);
    }
}

impl<D> Drop for AnalysisLease<D> {
    fn drop(&mut self) {
        self.shared.busy.store(false, Ordering::Release);
        drop(self.frame.take());
    }
}
