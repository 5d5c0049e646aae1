//! Gallery export: copies captured stills into long-term storage.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("source has no file name: {0}")]
    NoFileName(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A directory that captured stills are exported into.
#[derive(Debug, Clone)]
pub struct Gallery {
    dir: PathBuf,
}

impl Gallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into the gallery under its own file name.
    ///
    /// The copy is written under a `.pending` name and renamed once complete,
    /// so gallery readers never see a partial file.
    pub fn export(&self, source: &Path) -> Result<PathBuf, ExportError> {
        let name = source
            .file_name()
            .ok_or_else(|| ExportError::NoFileName(source.to_path_buf()))?;

        std::fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(name);
        let mut pending = target.clone().into_os_string();
        pending.push(".pending");
        let pending = PathBuf::from(pending);

        if let Err(e) = std::fs::copy(source, &pending) {
            let _ = std::fs::remove_file(&pending);
            return Err(e.into());
        }
        std::fs::rename(&pending, &target)?;

        tracing::info!(target = %target.display(), "exported to gallery");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("facetype-gallery-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_export_copies_file() {
        let root = scratch_dir("copy");
        std::fs::create_dir_all(&root).unwrap();
        let source = root.join("shot_42.jpg");
        std::fs::write(&source, b"jpeg bytes").unwrap();

        let gallery = Gallery::new(root.join("Pictures/FaceType"));
        let target = gallery.export(&source).unwrap();

        assert_eq!(target, gallery.dir().join("shot_42.jpg"));
        assert_eq!(std::fs::read(&target).unwrap(), b"jpeg bytes");
        assert!(source.exists(), "export must not move the source");
        assert!(!gallery.dir().join("shot_42.jpg.pending").exists());

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_export_missing_source_fails() {
        let root = scratch_dir("missing");
        let gallery = Gallery::new(root.join("out"));
        let err = gallery.export(&root.join("nope.jpg")).unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
        std::fs::remove_dir_all(&root).ok();
    }
}
