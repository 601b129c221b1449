use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::errors::FerryError;

/// Removes each path that is a regular file. Missing paths are skipped.
///
/// Never fails: removal errors are logged and handed back so the caller can
/// look at them, but they do not stop anything.
pub fn cleanup<P: AsRef<Path>>(paths: &[P]) -> Vec<FerryError> {
    let mut errors = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if let Err(e) = remove_file(path) {
            log::warn!("{}", e);
            errors.push(e);
        }
    }
    errors
}

/// Deletes `path` if it is a regular file. Returns whether anything was removed.
pub fn remove_file(path: &Path) -> Result<bool, FerryError> {
    if !path.is_file() {
        return Ok(false);
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FerryError::Cleanup {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// A local file that lives only as long as this guard.
///
/// The file does not need to exist yet; whatever is at the path when the
/// guard drops is cleaned up, on success and on every error path.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ScratchFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        cleanup(&[&self.path]);
    }
}
