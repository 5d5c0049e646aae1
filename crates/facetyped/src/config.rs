use crate::settings::{SettingsError, TimerDuration};
use facetype_hw::{FrameError, Rotation};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("camera_rotation: {0}")]
    Rotation(#[from] FrameError),
    #[error("default_timer_secs: {0}")]
    Timer(#[from] SettingsError),
}

/// Daemon configuration.
///
/// Built from defaults, then an optional TOML file (`$FACETYPE_CONFIG`, or
/// `$XDG_CONFIG_HOME/facetype/config.toml`), then `FACETYPE_*` variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Clockwise degrees to turn sensor frames upright.
    pub camera_rotation: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Where encoded stills are written before export.
    pub cache_dir: PathBuf,
    /// Long-term destination for captured stills.
    pub gallery_dir: PathBuf,
    pub countdown_tick_ms: u64,
    pub analysis_timeout_ms: u64,
    pub capture_timeout_ms: u64,
    /// Maximum records kept; 0 or absent keeps everything.
    pub history_capacity: Option<usize>,
    pub default_timer_secs: u32,
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        let cache_dir = std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".cache"))
            .join("facetype");

        Self {
            camera_device: "/dev/video0".to_string(),
            camera_rotation: 0,
            model_dir: facetype_core::default_model_dir(),
            cache_dir,
            gallery_dir: home.join("Pictures").join("FaceType"),
            countdown_tick_ms: 1000,
            analysis_timeout_ms: 2000,
            capture_timeout_ms: 10_000,
            history_capacity: None,
            default_timer_secs: 0,
            jpeg_quality: 90,
        }
    }
}

impl Config {
    /// Load the layered configuration for this process.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FACETYPE_*` variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACETYPE_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("FACETYPE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETYPE_CACHE_DIR") {
            self.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETYPE_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(v);
        }
        env_parse(&lookup, "FACETYPE_CAMERA_ROTATION", &mut self.camera_rotation);
        env_parse(&lookup, "FACETYPE_COUNTDOWN_TICK_MS", &mut self.countdown_tick_ms);
        env_parse(&lookup, "FACETYPE_ANALYSIS_TIMEOUT_MS", &mut self.analysis_timeout_ms);
        env_parse(&lookup, "FACETYPE_CAPTURE_TIMEOUT_MS", &mut self.capture_timeout_ms);
        env_parse(&lookup, "FACETYPE_DEFAULT_TIMER_SECS", &mut self.default_timer_secs);
        env_parse(&lookup, "FACETYPE_JPEG_QUALITY", &mut self.jpeg_quality);

        let mut capacity = self.history_capacity.unwrap_or(0);
        env_parse(&lookup, "FACETYPE_HISTORY_CAPACITY", &mut capacity);
        self.history_capacity = Some(capacity).filter(|&c| c > 0);
    }

    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rotation()?;
        self.default_timer()?;
        Ok(())
    }

    pub fn rotation(&self) -> Result<Rotation, FrameError> {
        Rotation::from_degrees(self.camera_rotation)
    }

    pub fn default_timer(&self) -> Result<TimerDuration, SettingsError> {
        TimerDuration::try_from(self.default_timer_secs)
    }

    /// `None` means unbounded.
    pub fn history_capacity(&self) -> Option<usize> {
        self.history_capacity.filter(|&c| c > 0)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("FACETYPE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()
        .map(|dir| dir.join("facetype").join("config.toml"))
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}
