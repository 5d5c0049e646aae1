//! Shutter → countdown → capture → result state machine.
//!
//! One session at a time: the shutter only starts a session from `Idle`, and
//! the check-and-set happens under the state channel's lock. Presses while
//! counting down, capturing, or while a result awaits acknowledgement are
//! ignored. There is no cancel; a countdown only ends early when the session
//! task is dropped at shutdown.
//!
//! A failed capture stays in `Failed` with its reason until it is
//! acknowledged. Pressing the shutter from `Failed` dismisses the failure and
//! starts a new session.

use crate::history::HistoryStore;
use crate::record::{AnalysisRecord, EncodedImage};
use crate::settings::{AspectRatio, CaptureSettings, FlashMode, LensFacing, TimerDuration};
use facetype_core::ResultDeriver;
use facetype_hw::ExportError;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("capture timed out after {0:?}")]
    TimedOut(Duration),
}

/// Produces an encoded still when the shutter fires.
pub trait ImageEncoder: Send + Sync + 'static {
    fn capture(
        &self,
        settings: &CaptureSettings,
    ) -> impl Future<Output = Result<EncodedImage, CaptureError>> + Send;
}

/// Copies a completed capture to durable storage.
pub trait StorageExporter: Send + Sync + 'static {
    fn export(
        &self,
        image: &EncodedImage,
    ) -> impl Future<Output = Result<PathBuf, ExportError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    CountingDown { remaining: u32 },
    Capturing,
    Completed(AnalysisRecord),
    Failed { reason: String },
}

/// One-shot notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CaptureEvent {
    PermissionRequired,
    CountdownTick(u32),
    CaptureStarted,
    Completed(AnalysisRecord),
    CaptureFailed(String),
    Exported { identity: String, path: PathBuf },
    ExportFailed { identity: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterOutcome {
    Started,
    Ignored,
    PermissionRequested,
}

impl ShutterOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Ignored => "ignored",
            Self::PermissionRequested => "permission_requested",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Length of one countdown step.
    pub countdown_tick: Duration,
    pub capture_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            countdown_tick: Duration::from_secs(1),
            capture_timeout: Duration::from_secs(10),
        }
    }
}

struct Inner<E, X> {
    encoder: E,
    exporter: X,
    deriver: Arc<dyn ResultDeriver>,
    history: Arc<dyn HistoryStore>,
    state: watch::Sender<CaptureState>,
    settings: watch::Sender<CaptureSettings>,
    permission: AtomicBool,
    events: broadcast::Sender<CaptureEvent>,
    config: CaptureConfig,
}

/// Clone-safe handle to the capture state machine.
pub struct CaptureStateMachine<E, X> {
    inner: Arc<Inner<E, X>>,
    runtime: Handle,
}

impl<E, X> Clone for CaptureStateMachine<E, X> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            runtime: self.runtime.clone(),
        }
    }
}

impl<E: ImageEncoder, X: StorageExporter> CaptureStateMachine<E, X> {
    /// Build an idle state machine. Camera permission starts out denied.
    pub fn new(
        encoder: E,
        exporter: X,
        deriver: Arc<dyn ResultDeriver>,
        history: Arc<dyn HistoryStore>,
        config: CaptureConfig,
        runtime: Handle,
    ) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);
        let (settings, _) = watch::channel(CaptureSettings::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                encoder,
                exporter,
                deriver,
                history,
                state,
                settings,
                permission: AtomicBool::new(false),
                events,
                config,
            }),
            runtime,
        }
    }

    /// Handle a shutter press.
    pub fn press_shutter(&self) -> ShutterOutcome {
        if !self.inner.permission.load(Ordering::Acquire) {
            tracing::info!("shutter pressed without camera permission");
            let _ = self.inner.events.send(CaptureEvent::PermissionRequired);
            return ShutterOutcome::PermissionRequested;
        }

        let settings = self.settings();
        let timer = settings.timer.secs();
        let claimed = self.inner.state.send_if_modified(|state| {
            if !matches!(state, CaptureState::Idle | CaptureState::Failed { .. }) {
                return false;
            }
            *state = if timer > 0 {
                CaptureState::CountingDown { remaining: timer }
            } else {
                CaptureState::Capturing
            };
            true
        });

        if !claimed {
            tracing::debug!(state = ?*self.inner.state.borrow(), "shutter ignored, session active");
            return ShutterOutcome::Ignored;
        }

        tracing::info!(timer, "capture session started");
        let session = Session {
            inner: Arc::clone(&self.inner),
            settings,
        };
        self.runtime.spawn(session.run());
        ShutterOutcome::Started
    }

    /// Return to `Idle` after a result or failure has been shown.
    pub fn acknowledge(&self) -> bool {
        self.inner.state.send_if_modified(|state| {
            if matches!(state, CaptureState::Completed(_) | CaptureState::Failed { .. }) {
                *state = CaptureState::Idle;
                true
            } else {
                false
            }
        })
    }

    pub fn set_permission(&self, granted: bool) {
        self.inner.permission.store(granted, Ordering::Release);
        tracing::info!(granted, "camera permission updated");
    }

    pub fn has_permission(&self) -> bool {
        self.inner.permission.load(Ordering::Acquire)
    }

    pub fn state(&self) -> CaptureState {
        self.inner.state.borrow().clone()
    }

    pub fn settings(&self) -> CaptureSettings {
        *self.inner.settings.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CaptureState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CaptureEvent> {
        self.inner.events.subscribe()
    }

    /// Applies to the next shutter press; a running countdown keeps its length.
    pub fn set_timer(&self, timer: TimerDuration) {
        self.inner.settings.send_modify(|s| s.timer = timer);
    }

    pub fn cycle_timer(&self) -> TimerDuration {
        self.update_settings(|s| s.timer = s.timer.cycle()).timer
    }

    pub fn set_flash(&self, flash: FlashMode) {
        self.inner.settings.send_modify(|s| s.flash = flash);
    }

    pub fn cycle_flash(&self) -> FlashMode {
        self.update_settings(|s| s.flash = s.flash.cycle()).flash
    }

    pub fn set_lens(&self, lens: LensFacing) {
        self.inner.settings.send_modify(|s| s.lens = lens);
    }

    pub fn cycle_aspect_ratio(&self) -> AspectRatio {
        self.update_settings(|s| s.aspect_ratio = s.aspect_ratio.cycle())
            .aspect_ratio
    }

    fn update_settings(&self, f: impl FnOnce(&mut CaptureSettings)) -> CaptureSettings {
        let mut updated = CaptureSettings::default();
        self.inner.settings.send_modify(|s| {
            f(s);
            updated = *s;
        });
        updated
    }
}

/// A running capture session.
///
/// Dropping an unfinished session (shutdown, panic) puts the machine back to
/// `Idle` so the shutter is never wedged.
struct Session<E, X> {
    inner: Arc<Inner<E, X>>,
    settings: CaptureSettings,
}

impl<E: ImageEncoder, X: StorageExporter> Session<E, X> {
    async fn run(self) {
        let inner = &self.inner;

        let mut remaining = self.settings.timer.secs();
        while remaining > 0 {
            let _ = inner.events.send(CaptureEvent::CountdownTick(remaining));
            tokio::time::sleep(inner.config.countdown_tick).await;
            remaining -= 1;
            inner.state.send_replace(if remaining > 0 {
                CaptureState::CountingDown { remaining }
            } else {
                CaptureState::Capturing
            });
        }

        let _ = inner.events.send(CaptureEvent::CaptureStarted);
        let timeout = inner.config.capture_timeout;
        let encoded = match tokio::time::timeout(timeout, inner.encoder.capture(&self.settings)).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::TimedOut(timeout)),
        };

        match encoded {
            Ok(image) => self.complete(image).await,
            Err(e) => self.fail(e),
        }
    }

    async fn complete(&self, image: EncodedImage) {
        let inner = &self.inner;
        let result = inner.deriver.derive(&image.identity);
        let record = AnalysisRecord::new(image, result);
        tracing::info!(
            identity = %record.image.identity,
            label = %result.label,
            score = result.score,
            "capture completed"
        );

        inner.history.append(record.clone());
        inner.state.send_replace(CaptureState::Completed(record.clone()));
        let _ = inner.events.send(CaptureEvent::Completed(record.clone()));

        // Export failures never undo the record or the transition.
        let identity = record.image.identity.clone();
        match inner.exporter.export(&record.image).await {
            Ok(path) => {
                let _ = inner.events.send(CaptureEvent::Exported { identity, path });
            }
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "export to gallery failed");
                let _ = inner.events.send(CaptureEvent::ExportFailed {
                    identity,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Held until acknowledged or the next shutter press.
    fn fail(&self, error: CaptureError) {
        let reason = error.to_string();
        tracing::warn!(reason = %reason, "capture failed");
        self.inner.state.send_replace(CaptureState::Failed {
            reason: reason.clone(),
        });
        let _ = self.inner.events.send(CaptureEvent::CaptureFailed(reason));
    }
}

impl<E, X> Drop for Session<E, X> {
    fn drop(&mut self) {
        self.inner.state.send_if_modified(|state| {
            if matches!(state, CaptureState::CountingDown { .. } | CaptureState::Capturing) {
                *state = CaptureState::Idle;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;
    use facetype_core::{HashDeriver, PersonalityType};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    enum Encode {
        Succeed(&'static str),
        Gated(Arc<Semaphore>, &'static str),
        Fail,
        Hang,
    }

    struct FakeEncoder {
        calls: Arc<AtomicUsize>,
        behaviour: Encode,
    }

    impl ImageEncoder for FakeEncoder {
        fn capture(
            &self,
            _settings: &CaptureSettings,
        ) -> impl Future<Output = Result<EncodedImage, CaptureError>> + Send {
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let identity = match &self.behaviour {
                    Encode::Succeed(id) => *id,
                    Encode::Gated(gate, id) => {
                        gate.acquire().await.unwrap().forget();
                        *id
                    }
                    Encode::Fail => return Err(CaptureError::Encode("sensor glitch".into())),
                    Encode::Hang => std::future::pending().await,
                };
                Ok(EncodedImage {
                    identity: identity.to_string(),
                    path: PathBuf::from("/tmp/cache").join(identity),
                })
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeExporter {
        fail: bool,
        exported: Arc<Mutex<Vec<String>>>,
    }

    impl StorageExporter for FakeExporter {
        fn export(
            &self,
            image: &EncodedImage,
        ) -> impl Future<Output = Result<PathBuf, ExportError>> + Send {
            let identity = image.identity.clone();
            async move {
                if self.fail {
                    return Err(ExportError::Io(std::io::Error::other("disk full")));
                }
                self.exported.lock().unwrap().push(identity.clone());
                Ok(PathBuf::from("/gallery").join(identity))
            }
        }
    }

    struct Rig {
        machine: CaptureStateMachine<FakeEncoder, FakeExporter>,
        history: Arc<InMemoryHistory>,
        calls: Arc<AtomicUsize>,
        exporter: FakeExporter,
        events: broadcast::Receiver<CaptureEvent>,
    }

    fn rig(behaviour: Encode, exporter: FakeExporter) -> Rig {
        let history = Arc::new(InMemoryHistory::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let machine = CaptureStateMachine::new(
            FakeEncoder {
                calls: Arc::clone(&calls),
                behaviour,
            },
            exporter.clone(),
            Arc::new(HashDeriver),
            history.clone(),
            CaptureConfig {
                countdown_tick: Duration::from_secs(1),
                capture_timeout: Duration::from_secs(2),
            },
            Handle::current(),
        );
        machine.set_permission(true);
        let events = machine.subscribe_events();
        Rig {
            machine,
            history,
            calls,
            exporter,
            events,
        }
    }

    async fn next(events: &mut broadcast::Receiver<CaptureEvent>) -> CaptureEvent {
        events.recv().await.expect("event stream open")
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_session_end_to_end() {
        let mut rig = rig(Encode::Succeed("shot_1000.jpg"), FakeExporter::default());
        rig.machine.set_timer(TimerDuration::Three);

        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Started);
        assert_eq!(rig.machine.state(), CaptureState::CountingDown { remaining: 3 });

        assert_eq!(next(&mut rig.events).await, CaptureEvent::CountdownTick(3));
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CountdownTick(2));
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CountdownTick(1));
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CaptureStarted);

        let CaptureEvent::Completed(record) = next(&mut rig.events).await else {
            panic!("expected completion");
        };
        assert_eq!(record.image.identity, "shot_1000.jpg");
        assert_eq!(record.result.label, PersonalityType::Isfj);
        assert_eq!(record.result.score, 99);

        assert!(matches!(next(&mut rig.events).await, CaptureEvent::Exported { .. }));
        assert_eq!(*rig.exporter.exported.lock().unwrap(), vec!["shot_1000.jpg".to_string()]);

        assert_eq!(rig.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.history.len(), 1);
        assert_eq!(rig.history.snapshot()[0], record);
        assert_eq!(rig.machine.state(), CaptureState::Completed(record));

        assert!(rig.machine.acknowledge());
        assert_eq!(rig.machine.state(), CaptureState::Idle);
        assert!(!rig.machine.acknowledge());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_states_are_published() {
        let rig = rig(Encode::Succeed("shot_5.jpg"), FakeExporter::default());
        rig.machine.set_timer(TimerDuration::Three);
        let mut states = rig.machine.subscribe_state();

        rig.machine.press_shutter();
        let mut seen = vec![states.borrow_and_update().clone()];
        while !matches!(seen.last(), Some(CaptureState::Completed(_))) {
            states.changed().await.unwrap();
            seen.push(states.borrow_and_update().clone());
        }

        let remaining: Vec<u32> = seen
            .iter()
            .filter_map(|s| match s {
                CaptureState::CountingDown { remaining } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(remaining, vec![3, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutter_ignored_while_counting_down() {
        let mut rig = rig(Encode::Succeed("shot_1.jpg"), FakeExporter::default());
        rig.machine.set_timer(TimerDuration::Five);

        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Started);
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CountdownTick(5));
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CountdownTick(4));

        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Ignored);
        assert_eq!(rig.machine.state(), CaptureState::CountingDown { remaining: 4 });

        loop {
            if let CaptureEvent::Completed(_) = next(&mut rig.events).await {
                break;
            }
        }
        assert_eq!(rig.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutter_ignored_while_capturing_and_until_acknowledged() {
        let gate = Arc::new(Semaphore::new(0));
        let mut rig = rig(
            Encode::Gated(Arc::clone(&gate), "shot_2.jpg"),
            FakeExporter::default(),
        );

        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Started);
        assert_eq!(rig.machine.state(), CaptureState::Capturing);
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CaptureStarted);
        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Ignored);
        assert_eq!(rig.machine.state(), CaptureState::Capturing);

        gate.add_permits(1);
        assert!(matches!(next(&mut rig.events).await, CaptureEvent::Completed(_)));
        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Ignored);
        assert_eq!(rig.calls.load(Ordering::SeqCst), 1);

        rig.machine.acknowledge();
        gate.add_permits(1);
        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Started);
        loop {
            if let CaptureEvent::Completed(_) = next(&mut rig.events).await {
                break;
            }
        }
        assert_eq!(rig.calls.load(Ordering::SeqCst), 2);
        assert_eq!(rig.history.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutter_without_permission_only_requests_it() {
        let mut rig = rig(Encode::Succeed("shot_3.jpg"), FakeExporter::default());
        rig.machine.set_permission(false);

        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::PermissionRequested);
        assert_eq!(next(&mut rig.events).await, CaptureEvent::PermissionRequired);
        assert_eq!(rig.machine.state(), CaptureState::Idle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rig.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rig.history.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_encode_failure_held_until_acknowledged() {
        let mut rig = rig(Encode::Fail, FakeExporter::default());
        let mut states = rig.machine.subscribe_state();

        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Started);
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CaptureStarted);
        let CaptureEvent::CaptureFailed(reason) = next(&mut rig.events).await else {
            panic!("expected failure event");
        };
        assert!(reason.contains("sensor glitch"));

        let CaptureState::Failed { reason: held } = states.borrow_and_update().clone() else {
            panic!("expected failed state");
        };
        assert_eq!(held, reason);
        assert_eq!(rig.machine.state(), CaptureState::Failed { reason });
        assert_eq!(rig.history.len(), 0);

        // No automatic retry.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rig.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(rig.machine.state(), CaptureState::Failed { .. }));

        assert!(rig.machine.acknowledge());
        assert_eq!(rig.machine.state(), CaptureState::Idle);
        assert!(!rig.machine.acknowledge());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutter_after_failure_starts_new_session() {
        let mut rig = rig(Encode::Fail, FakeExporter::default());

        rig.machine.press_shutter();
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CaptureStarted);
        assert!(matches!(next(&mut rig.events).await, CaptureEvent::CaptureFailed(_)));

        assert_eq!(rig.machine.press_shutter(), ShutterOutcome::Started);
        assert_eq!(rig.machine.state(), CaptureState::Capturing);
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CaptureStarted);
        assert!(matches!(next(&mut rig.events).await, CaptureEvent::CaptureFailed(_)));
        assert_eq!(rig.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_event_json() {
        let tick = serde_json::to_value(CaptureEvent::CountdownTick(3)).unwrap();
        assert_eq!(tick, serde_json::json!({ "event": "countdown_tick", "data": 3 }));

        let failed = serde_json::to_value(CaptureEvent::CaptureFailed("no camera".into())).unwrap();
        assert_eq!(failed["event"], "capture_failed");
        assert_eq!(failed["data"], "no camera");

        let started = serde_json::to_value(CaptureEvent::CaptureStarted).unwrap();
        assert_eq!(started, serde_json::json!({ "event": "capture_started" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_encoder_times_out() {
        let mut rig = rig(Encode::Hang, FakeExporter::default());

        rig.machine.press_shutter();
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CaptureStarted);
        let CaptureEvent::CaptureFailed(reason) = next(&mut rig.events).await else {
            panic!("expected failure event");
        };
        assert!(reason.contains("timed out"), "{reason}");
        assert_eq!(rig.machine.state(), CaptureState::Failed { reason });
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_failure_keeps_record() {
        let exporter = FakeExporter {
            fail: true,
            ..Default::default()
        };
        let mut rig = rig(Encode::Succeed("shot_4.jpg"), exporter);

        rig.machine.press_shutter();
        assert_eq!(next(&mut rig.events).await, CaptureEvent::CaptureStarted);
        assert!(matches!(next(&mut rig.events).await, CaptureEvent::Completed(_)));
        let CaptureEvent::ExportFailed { identity, reason } = next(&mut rig.events).await else {
            panic!("expected export failure");
        };
        assert_eq!(identity, "shot_4.jpg");
        assert!(reason.contains("disk full"));

        assert_eq!(rig.history.len(), 1);
        assert!(matches!(rig.machine.state(), CaptureState::Completed(_)));
    }

    #[tokio::test]
    async fn test_settings_cycles() {
        let rig = rig(Encode::Succeed("x"), FakeExporter::default());
        assert_eq!(rig.machine.cycle_timer(), TimerDuration::Three);
        assert_eq!(rig.machine.cycle_timer(), TimerDuration::Five);
        assert_eq!(rig.machine.cycle_timer(), TimerDuration::Off);
        assert_eq!(rig.machine.cycle_flash(), FlashMode::On);
        rig.machine.set_flash(FlashMode::Auto);
        assert_eq!(rig.machine.settings().flash, FlashMode::Auto);
        assert_eq!(rig.machine.cycle_aspect_ratio(), AspectRatio::R3x4);
        rig.machine.set_lens(LensFacing::Back);
        assert_eq!(rig.machine.settings().lens, LensFacing::Back);
    }

    #[test]
    fn test_dropped_session_resets_to_idle() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let history = Arc::new(InMemoryHistory::new());
        let machine = CaptureStateMachine::new(
            FakeEncoder {
                calls: Arc::new(AtomicUsize::new(0)),
                behaviour: Encode::Hang,
            },
            FakeExporter::default(),
            Arc::new(HashDeriver),
            history,
            CaptureConfig::default(),
            runtime.handle().clone(),
        );
        machine.set_permission(true);
        machine.set_timer(TimerDuration::Three);

        assert_eq!(machine.press_shutter(), ShutterOutcome::Started);
        assert_eq!(machine.state(), CaptureState::CountingDown { remaining: 3 });

        drop(runtime);
        assert_eq!(machine.state(), CaptureState::Idle);
    }
}
