use crate::capture::{CaptureEvent, CaptureState, CaptureStateMachine};
use crate::devices::{CameraStillEncoder, GalleryExporter};
use crate::engine::DetectorHandle;
use crate::history::{HistorySnapshot, HistoryStore};
use crate::pipeline::{FrameAnalysisPipeline, PipelineStats};
use crate::settings::{CaptureSettings, FlashMode, LensFacing, TimerDuration};
use facetype_core::{FaceMetrics, ResultDeriver};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.sweetapps.FaceType1";
pub const OBJECT_PATH: &str = "/org/sweetapps/FaceType1";

pub type DaemonCapture = CaptureStateMachine<CameraStillEncoder, GalleryExporter>;
pub type DaemonPipeline = FrameAnalysisPipeline<DetectorHandle>;

/// D-Bus interface for the FaceType capture daemon.
///
/// Bus name: org.sweetapps.FaceType1
/// Object path: /org/sweetapps/FaceType1
pub struct FaceTypeService {
    capture: DaemonCapture,
    /// `None` when no detector model is installed.
    pipeline: Option<DaemonPipeline>,
    history: Arc<dyn HistoryStore>,
    deriver: Arc<dyn ResultDeriver>,
}

impl FaceTypeService {
    pub fn new(
        capture: DaemonCapture,
        pipeline: Option<DaemonPipeline>,
        history: Arc<dyn HistoryStore>,
        deriver: Arc<dyn ResultDeriver>,
    ) -> Self {
        Self {
            capture,
            pipeline,
            history,
            deriver,
        }
    }

    /// Subscribe to everything [`forward_signals`] re-emits.
    pub fn signal_sources(&self) -> SignalSources {
        SignalSources {
            states: self.capture.subscribe_state(),
            events: self.capture.subscribe_events(),
            history: self.history.observe(),
            metrics: self.pipeline.as_ref().map(|p| p.subscribe()),
        }
    }

    fn report(&self) -> StatusReport {
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            state: self.capture.state(),
            settings: self.capture.settings(),
            camera_permission: self.capture.has_permission(),
            live_metrics: self.pipeline.is_some(),
            metrics: self.pipeline.as_ref().and_then(|p| p.latest()),
            pipeline: self.pipeline.as_ref().map(|p| p.stats()),
            history_len: self.history.len(),
            last_capture_age_secs: self
                .history
                .snapshot()
                .front()
                .map(|r| r.captured_at.elapsed().as_secs()),
        }
    }
}

#[derive(Serialize)]
struct StatusReport {
    version: &'static str,
    state: CaptureState,
    settings: CaptureSettings,
    camera_permission: bool,
    live_metrics: bool,
    metrics: Option<FaceMetrics>,
    pipeline: Option<PipelineStats>,
    history_len: usize,
    /// Seconds since the newest record was captured.
    last_capture_age_secs: Option<u64>,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| zbus::fdo::Error::Failed(format!("serialization failed: {e}")))
}

#[interface(name = "org.sweetapps.FaceType1")]
impl FaceTypeService {
    /// Press the shutter. Returns "started", "ignored" or "permission_requested".
    async fn press_shutter(&self) -> String {
        let outcome = self.capture.press_shutter();
        tracing::info!(outcome = outcome.as_str(), "shutter pressed");
        outcome.as_str().to_string()
    }

    /// Dismiss a completed result. Returns false if nothing was waiting.
    async fn acknowledge(&self) -> bool {
        self.capture.acknowledge()
    }

    /// Set the self-timer to 0, 3 or 5 seconds.
    async fn set_timer(&self, secs: u32) -> zbus::fdo::Result<u32> {
        let timer = TimerDuration::try_from(secs)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        self.capture.set_timer(timer);
        tracing::info!(secs, "timer set");
        Ok(timer.secs())
    }

    async fn cycle_timer(&self) -> u32 {
        self.capture.cycle_timer().secs()
    }

    /// Select "off", "on" or "auto".
    async fn set_flash(&self, mode: &str) -> zbus::fdo::Result<String> {
        let mode = mode
            .parse::<FlashMode>()
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        self.capture.set_flash(mode);
        Ok(mode.as_str().to_string())
    }

    async fn cycle_flash(&self) -> String {
        self.capture.cycle_flash().as_str().to_string()
    }

    /// Select "front" or "back".
    async fn set_lens(&self, lens: &str) -> zbus::fdo::Result<String> {
        let lens = lens
            .parse::<LensFacing>()
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
        self.capture.set_lens(lens);
        tracing::info!(lens = lens.as_str(), "lens selected");
        Ok(lens.as_str().to_string())
    }

    async fn cycle_aspect_ratio(&self) -> String {
        self.capture.cycle_aspect_ratio().as_str().to_string()
    }

    /// Record the platform's camera permission decision.
    async fn set_camera_permission(&self, granted: bool) {
        self.capture.set_permission(granted);
    }

    /// Return daemon status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        to_json(&self.report())
    }

    /// Completed captures as JSON, most recent first.
    async fn history(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.history.snapshot();
        to_json(&*snapshot)
    }

    /// Derive the result for an arbitrary identity without capturing.
    async fn derive(&self, identity: &str) -> zbus::fdo::Result<String> {
        to_json(&self.deriver.derive(identity))
    }

    /// Capture state changed; `state` is the JSON form returned by `Status`.
    #[zbus(signal)]
    async fn state_changed(emitter: &SignalEmitter<'_>, state: &str) -> zbus::Result<()>;

    /// One-shot notification such as a countdown tick or a capture failure.
    #[zbus(signal)]
    async fn capture_event(emitter: &SignalEmitter<'_>, event: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn history_changed(emitter: &SignalEmitter<'_>, count: u32) -> zbus::Result<()>;

    /// Latest live face metrics, `null` when no face is in view.
    #[zbus(signal)]
    async fn metrics_changed(emitter: &SignalEmitter<'_>, metrics: &str) -> zbus::Result<()>;
}

/// Receivers feeding the service's signals.
pub struct SignalSources {
    states: watch::Receiver<CaptureState>,
    events: broadcast::Receiver<CaptureEvent>,
    history: watch::Receiver<HistorySnapshot>,
    metrics: Option<watch::Receiver<Option<FaceMetrics>>>,
}

/// Re-emit state, event, history and metrics updates as D-Bus signals on
/// [`OBJECT_PATH`]. Each forwarder stops when its source closes.
pub fn forward_signals(conn: &zbus::Connection, sources: SignalSources) -> zbus::Result<()> {
    let emitter = SignalEmitter::new(conn, OBJECT_PATH)?;
    let SignalSources {
        mut states,
        mut events,
        mut history,
        metrics,
    } = sources;

    let tx = emitter.clone();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let json = signal_json(&*states.borrow_and_update());
            let Some(json) = json else {
                continue;
            };
            log_emit("StateChanged", FaceTypeService::state_changed(&tx, &json).await);
        }
    });

    let tx = emitter.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(json) = signal_json(&event) else {
                        continue;
                    };
                    log_emit("CaptureEvent", FaceTypeService::capture_event(&tx, &json).await);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "capture event signals fell behind")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let tx = emitter.clone();
    tokio::spawn(async move {
        while history.changed().await.is_ok() {
            let count = u32::try_from(history.borrow_and_update().len()).unwrap_or(u32::MAX);
            log_emit("HistoryChanged", FaceTypeService::history_changed(&tx, count).await);
        }
    });

    if let Some(mut metrics) = metrics {
        tokio::spawn(async move {
            while metrics.changed().await.is_ok() {
                let json = signal_json(&*metrics.borrow_and_update());
                let Some(json) = json else {
                    continue;
                };
                log_emit("MetricsChanged", FaceTypeService::metrics_changed(&emitter, &json).await);
            }
        });
    }

    Ok(())
}

fn signal_json<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    serde_json::to_string(value)
        .map_err(|e| tracing::warn!(error = %e, "signal payload not serializable"))
        .ok()
}

fn log_emit(signal: &str, result: zbus::Result<()>) {
    if let Err(e) = result {
        tracing::warn!(signal, error = %e, "failed to emit signal");
    }
}
