//! Preview frames: rotation metadata, pooled pixel buffers, YUYV conversion.

use image::imageops;
use image::GrayImage;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

type ReleaseHook = Box<dyn FnOnce(Vec<u8>) + Send + Sync>;

/// Clockwise rotation needed to display a frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Result<Self, FrameError> {
        match degrees % 360 {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            _ => Err(FrameError::InvalidRotation(degrees)),
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }
}

/// A grayscale preview frame.
///
/// Dropping the frame releases it: the pixel buffer is handed to the release
/// hook (normally back to the camera's [`BufferPool`]) exactly once.
pub struct Frame {
    /// Grayscale pixel data (width * height bytes), sensor orientation.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub timestamp: Instant,
    pub sequence: u32,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, rotation: Rotation, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            rotation,
            timestamp: Instant::now(),
            sequence,
            release: None,
        }
    }

    /// Attach a hook that receives the pixel buffer when the frame is released.
    pub fn on_release(mut self, hook: impl FnOnce(Vec<u8>) + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    /// Copy the frame into an upright grayscale image.
    pub fn upright(&self) -> Result<GrayImage, FrameError> {
        let expected = (self.width * self.height) as usize;
        if self.data.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }
        let raw = GrayImage::from_raw(self.width, self.height, self.data[..expected].to_vec())
            .ok_or(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            })?;

        Ok(match self.rotation {
            Rotation::Deg0 => raw,
            Rotation::Deg90 => imageops::rotate90(&raw),
            Rotation::Deg180 => imageops::rotate180(&raw),
            Rotation::Deg270 => imageops::rotate270(&raw),
        })
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook(std::mem::take(&mut self.data));
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation", &self.rotation)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Recycles frame buffers between the camera thread and frame consumers.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
}

impl BufferPool {
    pub fn new(max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        })
    }

    /// Take an empty buffer, reusing a released one when available.
    pub fn take(&self) -> Vec<u8> {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        free.pop().unwrap_or_default()
    }

    /// Return a buffer to the pool. Buffers beyond `max_idle` are freed.
    pub fn give(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Wrap pixel data in a frame whose release returns the buffer here.
    pub fn frame(
        self: &Arc<Self>,
        data: Vec<u8>,
        width: u32,
        height: u32,
        rotation: Rotation,
        sequence: u32,
    ) -> Frame {
        let pool = Arc::clone(self);
        Frame::new(data, width, height, rotation, sequence).on_release(move |buf| pool.give(buf))
    }
}

/// Extract the Y channel of packed YUYV (4:2:2) into `out`.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(
    yuyv: &[u8],
    width: u32,
    height: u32,
    out: &mut Vec<u8>,
) -> Result<(), FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    out.clear();
    out.extend(yuyv[..expected].iter().step_by(2));
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unsupported rotation: {0} degrees")]
    InvalidRotation(u32),
}
