//! JPEG still encoding.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GrayImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("jpeg encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// File name for a still taken at `unix_millis`; doubles as the capture identity.
pub fn shot_file_name(unix_millis: u128) -> String {
    format!("shot_{unix_millis}.jpg")
}

/// Shot file name for the current wall-clock time.
pub fn next_shot_file_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    shot_file_name(millis)
}

/// Encode `image` as a JPEG at `dir/file_name`, creating `dir` if needed.
pub fn write_jpeg(
    image: &GrayImage,
    dir: &Path,
    file_name: &str,
    quality: u8,
) -> Result<PathBuf, EncodeError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);

    let mut writer = BufWriter::new(File::create(&path)?);
    JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100)).encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::L8,
    )?;
    writer.flush()?;

    tracing::debug!(path = %path.display(), "still encoded");
    Ok(path)
}
