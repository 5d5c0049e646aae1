//! Operator-facing capture settings.
//!
//! Only the timer changes core behaviour; lens, flash and aspect ratio are
//! recorded and handed to the still encoder unchanged.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unsupported timer duration: {0}s (allowed: 0, 3, 5)")]
    InvalidTimer(u32),
    #[error("unknown lens: {0} (allowed: front, back)")]
    InvalidLens(String),
    #[error("unknown flash mode: {0} (allowed: off, on, auto)")]
    InvalidFlash(String),
}

/// Self-timer before a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "u32")]
pub enum TimerDuration {
    #[default]
    Off,
    Three,
    Five,
}

impl TimerDuration {
    pub fn secs(&self) -> u32 {
        match self {
            Self::Off => 0,
            Self::Three => 3,
            Self::Five => 5,
        }
    }

    /// 0 → 3 → 5 → 0.
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::Three,
            Self::Three => Self::Five,
            Self::Five => Self::Off,
        }
    }
}

impl TryFrom<u32> for TimerDuration {
    type Error = SettingsError;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        match secs {
            0 => Ok(Self::Off),
            3 => Ok(Self::Three),
            5 => Ok(Self::Five),
            other => Err(SettingsError::InvalidTimer(other)),
        }
    }
}

impl From<TimerDuration> for u32 {
    fn from(timer: TimerDuration) -> Self {
        timer.secs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LensFacing {
    #[default]
    Front,
    Back,
}

impl LensFacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

impl std::str::FromStr for LensFacing {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" => Ok(Self::Front),
            "back" => Ok(Self::Back),
            _ => Err(SettingsError::InvalidLens(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    #[default]
    Off,
    On,
    Auto,
}

impl FlashMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Auto => "auto",
        }
    }

    /// off → on → auto → off.
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Auto,
            Self::Auto => Self::Off,
        }
    }
}

impl std::str::FromStr for FlashMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            "auto" => Ok(Self::Auto),
            _ => Err(SettingsError::InvalidFlash(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "3:4")]
    R3x4,
    #[serde(rename = "1:1")]
    R1x1,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::R3x4 => "3:4",
            Self::R1x1 => "1:1",
        }
    }

    /// full → 3:4 → 1:1 → full.
    pub fn cycle(self) -> Self {
        match self {
            Self::Full => Self::R3x4,
            Self::R3x4 => Self::R1x1,
            Self::R1x1 => Self::Full,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CaptureSettings {
    pub timer: TimerDuration,
    pub lens: LensFacing,
    pub flash: FlashMode,
    pub aspect_ratio: AspectRatio,
}
