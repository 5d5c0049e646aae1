//! Hardware-backed collaborators: the live camera feed, the still encoder
//! that grabs from it, and the gallery exporter.

use crate::capture::{CaptureError, ImageEncoder, StorageExporter};
use crate::record::EncodedImage;
use crate::settings::CaptureSettings;
use facetype_hw::{encode, BufferPool, Camera, ExportError, Frame, Gallery, Rotation};
use image::GrayImage;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

/// Idle buffers kept for reuse; two frames in flight plus headroom.
const POOL_IDLE: usize = 4;

type StillRequest = oneshot::Sender<GrayImage>;

/// Streams frames from a camera on the `facetype-camera` thread.
///
/// Every frame goes to the `on_frame` sink; pending still requests are served
/// from the same frame first. Dropping the feed stops the stream.
pub struct CameraFeed {
    stop: Arc<AtomicBool>,
    stills: StillSource,
    thread: Option<JoinHandle<()>>,
}

impl CameraFeed {
    pub fn start(
        camera: Camera,
        rotation: Rotation,
        mut on_frame: impl FnMut(Frame) + Send + 'static,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<StillRequest>();

        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("facetype-camera".into())
            .spawn(move || {
                tracing::info!(
                    device = %camera.device_path,
                    width = camera.width,
                    height = camera.height,
                    rotation = rotation.degrees(),
                    "camera feed started"
                );
                let pool = BufferPool::new(POOL_IDLE);
                let result = camera.stream(&pool, rotation, &thread_stop, |frame| {
                    serve_stills(&rx, &frame);
                    on_frame(frame);
                });
                match result {
                    Ok(delivered) => tracing::info!(delivered, "camera feed stopped"),
                    Err(e) => tracing::error!(error = %e, "camera feed failed"),
                }
            })?;

        Ok(Self {
            stop,
            stills: StillSource { tx },
            thread: Some(thread),
        })
    }

    pub fn stills(&self) -> StillSource {
        self.stills.clone()
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("camera thread panicked");
            }
        }
    }
}

/// Answer every queued still request with an upright copy of `frame`.
fn serve_stills(rx: &mpsc::Receiver<StillRequest>, frame: &Frame) {
    let mut still: Option<GrayImage> = None;
    while let Ok(reply) = rx.try_recv() {
        if reply.is_closed() {
            continue;
        }
        if still.is_none() {
            match frame.upright() {
                Ok(image) => still = Some(image),
                Err(e) => {
                    // Dropping the reply fails the pending capture.
                    tracing::warn!(error = %e, sequence = frame.sequence, "frame unusable for still");
                    continue;
                }
            }
        }
        if let Some(image) = &still {
            let _ = reply.send(image.clone());
        }
    }
}

/// Requests single frames from a running [`CameraFeed`].
#[derive(Clone)]
pub struct StillSource {
    tx: mpsc::Sender<StillRequest>,
}

impl StillSource {
    /// A source with no feed behind it; every grab fails.
    pub fn disconnected() -> Self {
        let (tx, _) = mpsc::channel();
        Self { tx }
    }

    /// Queue a request for the next frame. The request is registered before
    /// the returned future is first polled.
    pub fn grab(&self) -> impl Future<Output = Result<GrayImage, CaptureError>> + Send {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = self.tx.send(reply_tx).is_ok();
        async move {
            if !queued {
                return Err(CaptureError::CameraUnavailable(
                    "camera feed is not running".into(),
                ));
            }
            reply_rx.await.map_err(|_| {
                CaptureError::CameraUnavailable("no usable frame from camera feed".into())
            })
        }
    }
}

/// Encodes the next live frame as `shot_<unix-millis>.jpg` in the cache dir.
pub struct CameraStillEncoder {
    stills: StillSource,
    cache_dir: PathBuf,
    quality: u8,
}

impl CameraStillEncoder {
    pub fn new(stills: StillSource, cache_dir: PathBuf, quality: u8) -> Self {
        Self {
            stills,
            cache_dir,
            quality,
        }
    }
}

impl ImageEncoder for CameraStillEncoder {
    fn capture(
        &self,
        settings: &CaptureSettings,
    ) -> impl Future<Output = Result<EncodedImage, CaptureError>> + Send {
        let settings = *settings;
        async move {
            // Lens, flash and aspect ratio have no V4L2 counterpart here.
            tracing::debug!(
                lens = ?settings.lens,
                flash = ?settings.flash,
                aspect_ratio = ?settings.aspect_ratio,
                "grabbing still"
            );
            let image = self.stills.grab().await?;

            let identity = encode::next_shot_file_name();
            let file_name = identity.clone();
            let dir = self.cache_dir.clone();
            let quality = self.quality;
            let path = tokio::task::spawn_blocking(move || {
                encode::write_jpeg(&image, &dir, &file_name, quality)
            })
            .await
            .map_err(|e| CaptureError::Encode(format!("encoder task failed: {e}")))?
            .map_err(|e| CaptureError::Encode(e.to_string()))?;

            Ok(EncodedImage { identity, path })
        }
    }
}

/// Copies encoded stills into the user's gallery directory.
pub struct GalleryExporter {
    gallery: Arc<Gallery>,
}

impl GalleryExporter {
    pub fn new(gallery: Gallery) -> Self {
        Self {
            gallery: Arc::new(gallery),
        }
    }
}

impl StorageExporter for GalleryExporter {
    fn export(
        &self,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<PathBuf, ExportError>> + Send {
        let gallery = Arc::clone(&self.gallery);
        let source = image.path.clone();
        async move {
            tokio::task::spawn_blocking(move || gallery.export(&source))
                .await
                .map_err(|e| ExportError::Io(std::io::Error::other(e)))?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("facetype-devices-{}-{name}", std::process::id()))
    }

    fn source() -> (StillSource, mpsc::Receiver<StillRequest>) {
        let (tx, rx) = mpsc::channel();
        (StillSource { tx }, rx)
    }

    #[tokio::test]
    async fn test_still_served_upright_from_next_frame() {
        let (stills, rx) = source();
        let pending = stills.grab();

        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 3, 2, Rotation::Deg90, 9);
        serve_stills(&rx, &frame);

        let image = pending.await.unwrap();
        assert_eq!(image.dimensions(), (2, 3));
    }

    #[tokio::test]
    async fn test_one_frame_serves_every_waiting_request() {
        let (stills, rx) = source();
        let first = stills.grab();
        let second = stills.grab();

        serve_stills(&rx, &Frame::new(vec![7; 4], 2, 2, Rotation::Deg0, 0));
        assert_eq!(first.await.unwrap().as_raw(), &vec![7; 4]);
        assert_eq!(second.await.unwrap().as_raw(), &vec![7; 4]);
    }

    #[tokio::test]
    async fn test_unusable_frame_fails_request() {
        let (stills, rx) = source();
        let pending = stills.grab();
        serve_stills(&rx, &Frame::new(vec![0; 3], 2, 2, Rotation::Deg0, 0));
        assert!(matches!(pending.await, Err(CaptureError::CameraUnavailable(_))));
    }

    #[tokio::test]
    async fn test_disconnected_source_fails() {
        let stills = StillSource::disconnected();
        assert!(matches!(
            stills.grab().await,
            Err(CaptureError::CameraUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_encoder_writes_shot_file() {
        let (stills, rx) = source();
        let feeder = std::thread::spawn(move || {
            let reply = rx.recv().unwrap();
            let image = GrayImage::from_fn(8, 6, |x, _| image::Luma([(x * 30) as u8]));
            let _ = reply.send(image);
        });

        let dir = scratch_dir("encoder");
        let encoder = CameraStillEncoder::new(stills, dir.clone(), 85);
        let encoded = encoder.capture(&CaptureSettings::default()).await.unwrap();
        feeder.join().unwrap();

        assert!(encoded.identity.starts_with("shot_"));
        assert!(encoded.identity.ends_with(".jpg"));
        assert_eq!(encoded.path, dir.join(&encoded.identity));
        let decoded = image::open(&encoded.path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_gallery_exporter_copies_file() {
        let cache = scratch_dir("export-cache");
        let gallery_dir = scratch_dir("export-gallery");
        std::fs::create_dir_all(&cache).unwrap();
        let source = cache.join("shot_42.jpg");
        std::fs::write(&source, b"jpeg bytes").unwrap();

        let exporter = GalleryExporter::new(Gallery::new(&gallery_dir));
        let image = EncodedImage {
            identity: "shot_42.jpg".into(),
            path: source,
        };
        let exported = exporter.export(&image).await.unwrap();
        assert_eq!(exported, gallery_dir.join("shot_42.jpg"));
        assert_eq!(std::fs::read(&exported).unwrap(), b"jpeg bytes");

        let _ = std::fs::remove_dir_all(&cache);
        let _ = std::fs::remove_dir_all(&gallery_dir);
    }
}
