//! facetype-hw: camera and storage collaborators.
//!
//! V4L2 preview feed with pooled frame release, JPEG still encoding, and
//! gallery export.

pub mod camera;
pub mod encode;
pub mod frame;
pub mod gallery;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use encode::EncodeError;
pub use frame::{BufferPool, Frame, FrameError, Rotation};
pub use gallery::{ExportError, Gallery};
