//! Discovered audio files and the recording groups built from them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of an audio file taken at discovery time.
///
/// Nothing here is live: if the file changes on disk afterwards the snapshot
/// is simply stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Absolute path to the file
    pub path: PathBuf,

    /// File name including extension
    pub file_name: String,

    /// Size in bytes
    pub size: u64,

    /// Creation time, when the filesystem exposes one
    pub created: Option<DateTime<Utc>>,

    /// Sequence number parsed from the file name (if any)
    pub sequence: Option<u32>,
}

impl SourceFile {
    /// Build a snapshot from already-known attributes
    pub fn new(path: impl Into<PathBuf>, size: u64, created: Option<DateTime<Utc>>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let sequence = crate::core::classifier::parse_sequence(&file_name);

        Self {
            path,
            file_name,
            size,
            created,
            sequence,
        }
    }

    /// Stat a file on disk and snapshot it
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let created = metadata.created().ok().map(DateTime::<Utc>::from);
        Ok(Self::new(path, metadata.len(), created))
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }

    /// Lower-cased extension, if any
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Same snapshot, relocated to another path (used after staging)
    pub fn relocated(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

/// One logical recording: a standalone file or the ordered fragments of a
/// recording the device split into parts.
///
/// Members are always sorted by file name and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingGroup {
    base_name: String,
    members: Vec<SourceFile>,
}

impl RecordingGroup {
    /// Create a group; returns `None` for an empty member list
    pub fn new(base_name: impl Into<String>, mut members: Vec<SourceFile>) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        members.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        Some(Self {
            base_name: base_name.into(),
            members,
        })
    }

    /// Group holding a single standalone file
    pub fn single(file: SourceFile) -> Self {
        let base_name = crate::core::classifier::generic_base_name(file.stem()).0;
        Self {
            base_name,
            members: vec![file],
        }
    }

    /// Recording identity with per-fragment markers stripped
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn members(&self) -> &[SourceFile] {
        &self.members
    }

    pub fn into_members(self) -> Vec<SourceFile> {
        self.members
    }

    pub fn first(&self) -> &SourceFile {
        &self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// True when this group needs concatenation
    pub fn is_merge(&self) -> bool {
        self.members.len() > 1
    }

    /// Sum of member sizes in bytes
    pub fn total_size(&self) -> u64 {
        self.members.iter().map(|m| m.size).sum()
    }

    /// Output file name for this group.
    ///
    /// A standalone file keeps its own stem; a merged group becomes
    /// `<base>_merged.<ext>`.
    pub fn output_file_name(&self, extension: &str) -> String {
        let extension = extension.trim_start_matches('.');
        if self.members.len() == 1 {
            format!("{}.{}", self.first().stem(), extension)
        } else {
            format!("{}_merged.{}", self.base_name, extension)
        }
    }
}
