//! Per-request temporary audio file with single-shot deletion.

use std::{
    io,
    path::{Path, PathBuf},
};

use tempfile::TempPath;

const PREFIX: &str = "indextts-";
const SUFFIX: &str = ".wav";

/// An exclusively owned temporary output file.
///
/// The file is removed exactly once: either by an explicit [`delete`] or,
/// failing that, when the guard is dropped. Removal errors are logged and
/// swallowed.
///
/// [`delete`]: TempAudioArtifact::delete
#[derive(Debug)]
pub struct TempAudioArtifact {
    path: Option<TempPath>,
    display: PathBuf,
}

impl TempAudioArtifact {
    /// Reserve a uniquely named, empty file in `dir` (system temp dir if `None`).
    pub(crate) fn allocate(dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX).suffix(SUFFIX);
        let file = match dir {
            Some(d) => builder.tempfile_in(d)?,
            None => builder.tempfile()?,
        };
        let path = file.into_temp_path();
        let display = path.to_path_buf();
        Ok(Self { path: Some(path), display })
    }

    pub fn path(&self) -> &Path {
        &self.display
    }

    /// Whether the deletion attempt has already happened.
    pub fn is_released(&self) -> bool {
        self.path.is_none()
    }

    /// Remove the file now. Returns `false` if it was already released.
    pub fn delete(&mut self) -> bool {
        let Some(path) = self.path.take() else {
            return false;
        };
        match path.close() {
            Ok(()) => tracing::debug!(path = %self.display.display(), "temporary audio file deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.display.display(), "temporary audio file already gone")
            }
            Err(e) => tracing::error!(
                path = %self.display.display(),
                error = %e,
                "failed to delete temporary audio file"
            ),
        }
        true
    }
}

impl Drop for TempAudioArtifact {
    fn drop(&mut self) {
        self.delete();
    }
}
