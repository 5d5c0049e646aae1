use anyhow::{Context, Result};
use facetype_core::{HashDeriver, ResultDeriver, ScrfdDetector};
use facetype_hw::{Camera, CameraError, Gallery};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod dbus_interface;
mod devices;
mod engine;
mod history;
mod pipeline;
mod record;
mod settings;

use capture::{CaptureConfig, CaptureEvent, CaptureStateMachine};
use config::Config;
use dbus_interface::{forward_signals, DaemonPipeline, FaceTypeService, BUS_NAME, OBJECT_PATH};
use devices::{CameraFeed, CameraStillEncoder, GalleryExporter, StillSource};
use history::{HistoryStore, InMemoryHistory};
use pipeline::FrameAnalysisPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facetyped starting");

    let config = Config::load().context("failed to load configuration")?;
    let rotation = config.rotation()?;
    tracing::info!(
        camera = %config.camera_device,
        rotation = rotation.degrees(),
        gallery = %config.gallery_dir.display(),
        "configuration loaded"
    );

    let runtime = Handle::current();
    let pipeline = start_pipeline(&config, runtime.clone())?;

    let feed = match Camera::open(&config.camera_device) {
        Ok(camera) => {
            let sink = pipeline.clone();
            let feed = CameraFeed::start(camera, rotation, move |frame| {
                // Without a detector the frame is released right here.
                if let Some(pipeline) = &sink {
                    pipeline.on_frame(frame);
                }
            })?;
            Some(feed)
        }
        Err(CameraError::PermissionDenied(device)) => {
            tracing::warn!(device = %device, "camera access denied; shutter will request permission");
            None
        }
        Err(e) => return Err(e).context("failed to open camera"),
    };
    let stills = feed
        .as_ref()
        .map(CameraFeed::stills)
        .unwrap_or_else(StillSource::disconnected);

    let history: Arc<dyn HistoryStore> =
        Arc::new(InMemoryHistory::with_capacity(config.history_capacity()));
    let deriver: Arc<dyn ResultDeriver> = Arc::new(HashDeriver);

    let capture = CaptureStateMachine::new(
        CameraStillEncoder::new(stills, config.cache_dir.clone(), config.jpeg_quality),
        GalleryExporter::new(Gallery::new(&config.gallery_dir)),
        Arc::clone(&deriver),
        Arc::clone(&history),
        CaptureConfig {
            countdown_tick: config.countdown_tick(),
            capture_timeout: config.capture_timeout(),
        },
        runtime,
    );
    capture.set_timer(config.default_timer()?);
    capture.set_permission(feed.is_some());
    tokio::spawn(log_events(capture.subscribe_events()));

    let service = FaceTypeService::new(capture, pipeline, history, deriver);
    let signals = service.signal_sources();
    let conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;
    forward_signals(&conn, signals).context("failed to set up D-Bus signals")?;

    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "facetyped ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facetyped shutting down");
    drop(feed);

    Ok(())
}

/// Load the detector and start live analysis, or run without live metrics
/// when the model is missing.
fn start_pipeline(config: &Config, runtime: Handle) -> Result<Option<DaemonPipeline>> {
    let model_path = config.scrfd_model_path();
    let detector = match ScrfdDetector::load(&model_path) {
        Ok(detector) => detector,
        Err(e) => {
            tracing::warn!(
                path = %model_path.display(),
                error = %e,
                "face detector unavailable; live metrics disabled"
            );
            return Ok(None);
        }
    };
    tracing::info!(path = %model_path.display(), "SCRFD detector loaded");

    let handle = engine::spawn_engine(detector)?;
    Ok(Some(FrameAnalysisPipeline::new(
        handle,
        config.analysis_timeout(),
        runtime,
    )))
}

async fn log_events(mut events: broadcast::Receiver<CaptureEvent>) {
    loop {
        match events.recv().await {
            Ok(CaptureEvent::CountdownTick(n)) => tracing::debug!(remaining = n, "countdown"),
            Ok(CaptureEvent::Completed(record)) => tracing::info!(
                id = %record.id,
                label = %record.result.label,
                score = record.result.score,
                "result ready"
            ),
            Ok(CaptureEvent::Exported { identity, path }) => {
                tracing::info!(identity = %identity, path = %path.display(), "still exported")
            }
            Ok(event) => tracing::debug!(?event, "capture event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log fell behind")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
