use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use crate::errors::FerryError;

struct TrackerState {
    seen: u64,
    out: Box<dyn Write + Send>,
}

/// Byte counter for one file transfer.
///
/// Every [`ProgressTracker::increment`] rewrites a single status line:
/// `\r<file>  <seen> / <total>  (<percent>%)`.
pub struct ProgressTracker {
    file_name: PathBuf,
    total: u64,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// Reads the size of `path` and reports to standard output.
    pub fn new(path: &Path) -> Result<Self, FerryError> {
        Self::with_writer(path, Box::new(io::stdout()))
    }

    /// Fails with [`FerryError::NotFound`] for a missing file and with
    /// [`FerryError::Io`] when the file cannot be opened for reading.
    pub fn with_writer(path: &Path, out: Box<dyn Write + Send>) -> Result<Self, FerryError> {
        let metadata = match std::fs::File::open(path).and_then(|f| f.metadata()) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FerryError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(FerryError::io(path, e)),
        };

        Ok(ProgressTracker {
            file_name: path.to_path_buf(),
            total: metadata.len(),
            state: Mutex::new(TrackerState { seen: 0, out }),
        })
    }

    pub fn increment(&self, bytes: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.seen += bytes;
        let line = format!(
            "\r{}  {} / {}  ({:.2}%)",
            self.file_name.display(),
            state.seen,
            self.total,
            percentage(state.seen, self.total)
        );
        // A closed stdout must not fail the transfer.
        let _ = state.out.write_all(line.as_bytes());
        let _ = state.out.flush();
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn seen(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seen
    }

    pub fn percentage(&self) -> f64 {
        percentage(self.seen(), self.total)
    }
}

fn percentage(seen: u64, total: u64) -> f64 {
    if total == 0 {
        return 100f64;
    }
    (seen as f64 / total as f64) * 100f64
}
