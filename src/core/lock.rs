//! Cross-process guard ensuring a single ingestion job at a time.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::error::IngestError;

/// Held for the duration of a job; the lock is released on drop
#[derive(Debug)]
pub struct JobLock {
    file: File,
    path: PathBuf,
}

impl JobLock {
    /// Take the lock without waiting.
    ///
    /// Returns [`IngestError::JobInProgress`] when another process holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IngestError::ConfigurationError(format!(
                    "Failed to create lock directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| IngestError::from_io(e, path))?;

        file.try_lock_exclusive()
            .map_err(|_| IngestError::JobInProgress)?;

        debug!(lock = %path.display(), "Acquired job lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
