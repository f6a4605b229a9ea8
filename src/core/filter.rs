//! Small-file filter.
//!
//! Recordings under a byte threshold are usually accidental button presses.
//! When deletion is enabled they are removed from disk before grouping;
//! otherwise the filter only reports and lets everything through.

use tracing::{debug, warn};

use crate::domain::SourceFile;

/// Outcome of one filter pass
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Files that continue down the pipeline
    pub kept: Vec<SourceFile>,

    /// Files that were deleted for being too small
    pub removed: Vec<SourceFile>,
}

/// Remove recordings smaller than `threshold_bytes` (strict `<`).
///
/// Sizes are read from disk at call time. A file whose size cannot be read is
/// kept; a file that cannot be deleted is kept as well.
pub async fn filter_small_files(
    files: Vec<SourceFile>,
    threshold_bytes: u64,
    delete: bool,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for file in files {
        let size = match tokio::fs::metadata(&file.path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "Could not read size, keeping file");
                outcome.kept.push(file);
                continue;
            }
        };

        if size >= threshold_bytes {
            outcome.kept.push(file);
            continue;
        }

        if !delete {
            debug!(file = %file.file_name, size, "Below threshold, deletion disabled");
            outcome.kept.push(file);
            continue;
        }

        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => {
                debug!(file = %file.file_name, size, threshold_bytes, "Deleted small recording");
                outcome.removed.push(file);
            }
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "Failed to delete small recording, keeping it");
                outcome.kept.push(file);
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write(temp: &TempDir, name: &str, size: usize) -> SourceFile {
        let path = temp.path().join(name);
        tokio::fs::write(&path, vec![0u8; size]).await.unwrap();
        SourceFile::new(path, size as u64, None)
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let temp = TempDir::new().unwrap();
        let exact = write(&temp, "exact.wav", 100).await;
        let below = write(&temp, "below.wav", 99).await;

        let outcome = filter_small_files(vec![exact.clone(), below.clone()], 100, true).await;

        assert_eq!(outcome.kept, vec![exact.clone()]);
        assert_eq!(outcome.removed, vec![below.clone()]);
        assert!(exact.path.exists());
        assert!(!below.path.exists());
    }

    #[tokio::test]
    async fn test_advisory_mode_keeps_everything() {
        let temp = TempDir::new().unwrap();
        let small = write(&temp, "small.wav", 10).await;

        let outcome = filter_small_files(vec![small.clone()], 100, false).await;

        assert_eq!(outcome.kept.len(), 1);
        assert!(outcome.removed.is_empty());
        assert!(small.path.exists());
    }

    #[tokio::test]
    async fn test_unreadable_size_fails_open() {
        let temp = TempDir::new().unwrap();
        let missing = SourceFile::new(temp.path().join("gone.wav"), 1, None);

        let outcome = filter_small_files(vec![missing], 100, true).await;

        assert_eq!(outcome.kept.len(), 1);
        assert!(outcome.removed.is_empty());
    }
}
