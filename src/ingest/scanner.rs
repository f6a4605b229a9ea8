//! Source volume enumeration.
//!
//! Walks a mounted volume recursively and snapshots every raw recording on
//! it. Hidden entries are skipped; so is anything matching an exclude glob
//! (matched against the path relative to the volume root).

use std::path::Path;

use chrono::{DateTime, Utc};
use glob::Pattern;
use walkdir::{DirEntry, WalkDir};

use crate::core::IngestError;
use crate::domain::SourceFile;

/// Recursive scanner for raw recordings
#[derive(Debug, Clone)]
pub struct VolumeScanner {
    extension: String,
    exclude: Vec<Pattern>,
}

impl VolumeScanner {
    /// Scanner for files with `extension`; invalid exclude globs are ignored
    pub fn new(extension: impl Into<String>, exclude_patterns: &[String]) -> Self {
        let exclude = exclude_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("Ignoring invalid exclude pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect();

        Self {
            extension: extension.into().trim_start_matches('.').to_string(),
            exclude,
        }
    }

    /// Enumerate recordings under `root`, sorted by file name.
    ///
    /// Unreadable entries are logged and skipped.
    pub fn scan(&self, root: &Path) -> Result<Vec<SourceFile>, IngestError> {
        let metadata = std::fs::metadata(root).map_err(|e| IngestError::from_io(e, root))?;
        if !metadata.is_dir() {
            return Err(IngestError::ConfigurationError(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_skipped(root, e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_recording(entry.path()) {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    let created = metadata.created().ok().map(DateTime::<Utc>::from);
                    files.push(SourceFile::new(entry.path(), metadata.len(), created));
                }
                Err(e) => {
                    tracing::warn!("Failed to read metadata for {}: {}", entry.path().display(), e);
                }
            }
        }

        files.sort_by(|a, b| a.file_name.cmp(&b.file_name).then_with(|| a.path.cmp(&b.path)));

        tracing::debug!("Found {} recording(s) under {}", files.len(), root.display());
        Ok(files)
    }

    /// Async wrapper running the walk on the blocking pool
    pub async fn scan_async(&self, root: &Path) -> Result<Vec<SourceFile>, IngestError> {
        let scanner = self.clone();
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| IngestError::ConfigurationError(format!("Scan task failed: {}", e)))?
    }

    fn is_recording(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    fn is_skipped(&self, root: &Path, entry: &DirEntry) -> bool {
        if entry.file_name().to_string_lossy().starts_with('.') {
            return true;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        self.exclude.iter().any(|p| p.matches_path(relative))
    }
}
