use crate::pipeline::VisionDetector;
use facetype_core::{DetectedFace, DetectorError, ScrfdDetector};
use facetype_hw::Frame;
use image::GrayImage;
use std::future::Future;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("failed to spawn detector thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Blocking detector owned by the engine thread.
pub trait FrameDetector: Send + 'static {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<DetectedFace>, DetectorError>;
}

impl FrameDetector for ScrfdDetector {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<DetectedFace>, DetectorError> {
        ScrfdDetector::detect(self, image)
    }
}

/// Message sent from the analysis pipeline to the engine thread.
struct DetectRequest {
    image: GrayImage,
    reply: oneshot::Sender<Result<Vec<DetectedFace>, DetectorError>>,
}

/// Clone-safe handle to the detector thread.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectRequest>,
}

impl VisionDetector for DetectorHandle {
    fn detect(
        &self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Vec<DetectedFace>, DetectorError>> + Send {
        // Rotate on the caller's side so the engine thread only runs inference.
        let prepared = frame
            .upright()
            .map_err(|e| DetectorError::InferenceFailed(format!("unusable frame: {e}")));
        let tx = self.tx.clone();

        async move {
            let image = prepared?;
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(DetectRequest {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| closed())?;
            reply_rx.await.map_err(|_| closed())?
        }
    }
}

fn closed() -> DetectorError {
    DetectorError::Unavailable("detector thread exited".into())
}

/// Spawn the detector on a dedicated OS thread.
///
/// ONNX inference is blocking and the session is not shareable, so one thread
/// owns the detector and serves requests in order. The thread exits once every
/// [`DetectorHandle`] is dropped.
pub fn spawn_engine<T: FrameDetector>(mut detector: T) -> Result<DetectorHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<DetectRequest>(1);

    std::thread::Builder::new()
        .name("facetype-detector".into())
        .spawn(move || {
            tracing::info!("detector thread started");
            while let Some(req) = rx.blocking_recv() {
                // The caller gave up (timeout or cancellation); skip the work.
                if req.reply.is_closed() {
                    tracing::debug!("skipping abandoned detection request");
                    continue;
                }
                let started = std::time::Instant::now();
                let result = detector.detect(&req.image);
                tracing::trace!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    faces = result.as_ref().map(Vec::len).unwrap_or(0),
                    "detection finished"
                );
                let _ = req.reply.send(result);
            }
            tracing::info!("detector thread exiting");
        })?;

    Ok(DetectorHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetype_core::FaceBounds;
    use facetype_hw::Rotation;

    /// Reports one face covering the whole image it was given.
    struct WholeImage;

    impl FrameDetector for WholeImage {
        fn detect(&mut self, image: &GrayImage) -> Result<Vec<DetectedFace>, DetectorError> {
            Ok(vec![DetectedFace {
                bounds: FaceBounds {
                    x: 0.0,
                    y: 0.0,
                    width: image.width() as f32,
                    height: image.height() as f32,
                },
                confidence: 0.9,
                landmarks: Vec::new(),
                smiling_probability: None,
            }])
        }
    }

    struct Broken;

    impl FrameDetector for Broken {
        fn detect(&mut self, _image: &GrayImage) -> Result<Vec<DetectedFace>, DetectorError> {
            Err(DetectorError::InferenceFailed("bad tensor".into()))
        }
    }

    #[tokio::test]
    async fn test_detects_on_upright_image() {
        let handle = spawn_engine(WholeImage).unwrap();
        let frame = Frame::new(vec![0u8; 6], 3, 2, Rotation::Deg90, 0);

        let faces = handle.detect(&frame).await.unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].bounds.width, 2.0);
        assert_eq!(faces[0].bounds.height, 3.0);
    }

    #[tokio::test]
    async fn test_detector_errors_are_forwarded() {
        let handle = spawn_engine(Broken).unwrap();
        let frame = Frame::new(vec![0u8; 4], 2, 2, Rotation::Deg0, 0);
        assert!(matches!(
            handle.detect(&frame).await,
            Err(DetectorError::InferenceFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_short_frame_fails_before_reaching_thread() {
        let handle = spawn_engine(WholeImage).unwrap();
        let frame = Frame::new(vec![0u8; 3], 2, 2, Rotation::Deg0, 0);
        assert!(matches!(
            handle.detect(&frame).await,
            Err(DetectorError::InferenceFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_channel_reports_unavailable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = DetectorHandle { tx };
        let frame = Frame::new(vec![0u8; 4], 2, 2, Rotation::Deg0, 0);
        assert!(matches!(
            handle.detect(&frame).await,
            Err(DetectorError::Unavailable(_))
        ));
    }
}
