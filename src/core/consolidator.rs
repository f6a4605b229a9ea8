//! Audio consolidation.
//!
//! Turns one [`RecordingGroup`] into one output file:
//! - a standalone file already in the target format is moved (or copied when
//!   originals are preserved) without touching the audio;
//! - any other standalone file is transcoded;
//! - a multi-file group is validated, concatenated in member order and
//!   exported.
//!
//! Exports are written to a hidden `.partial` sibling and renamed into place
//! only after success, so the final name never holds a truncated file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::adapters::{AudioCodec, AudioTrack, ExportSource, TimelinePart};
use crate::domain::{OutputFormat, ProcessingOptions, RecordingGroup, SourceFile};

use super::error::IngestError;
use super::naming::{partial_path, unique_path};

/// Export attempts per output (first try included)
pub const MAX_EXPORT_ATTEMPTS: u32 = 2;

/// Pause between export attempts
pub const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A consolidated output file
#[derive(Debug, Clone, PartialEq)]
pub struct Consolidated {
    /// Final path at the destination
    pub path: PathBuf,

    /// Number of source files in the group
    pub members: usize,

    /// Whether the output was concatenated from several files
    pub merged: bool,

    /// Total duration of the exported timeline (merges only)
    pub duration: Option<Duration>,
}

/// Produces one output file per recording group
pub struct AudioConsolidator {
    codec: Arc<dyn AudioCodec>,
    retry_delay: Duration,
}

impl AudioConsolidator {
    /// Create a consolidator backed by `codec`
    pub fn new(codec: Arc<dyn AudioCodec>) -> Self {
        Self {
            codec,
            retry_delay: EXPORT_RETRY_DELAY,
        }
    }

    /// Override the pause between export attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn codec(&self) -> &dyn AudioCodec {
        self.codec.as_ref()
    }

    /// Consolidate `group` into `destination_dir`.
    ///
    /// Member files are deleted after success unless
    /// `options.preserve_originals` is set.
    #[instrument(skip_all, fields(group = %group.base_name(), members = group.len()))]
    pub async fn consolidate(
        &self,
        group: &RecordingGroup,
        destination_dir: &Path,
        options: &ProcessingOptions,
    ) -> Result<Consolidated, IngestError> {
        let format = options.output_format;
        let file_name = group.output_file_name(format.extension());

        let result = if group.is_merge() {
            self.merge(group, destination_dir, &file_name, format).await?
        } else {
            let file = group.first();
            let already_target = file
                .extension()
                .map(|ext| format.matches_extension(&ext))
                .unwrap_or(false);

            if already_target {
                // Move/copy already settles what happens to the source
                return self
                    .place_unchanged(file, destination_dir, &file_name, options.preserve_originals)
                    .await;
            }

            let path = self
                .export_with_retry(
                    &ExportSource::File(file.path.clone()),
                    destination_dir,
                    &file_name,
                    format,
                )
                .await?;

            Consolidated {
                path,
                members: 1,
                merged: false,
                duration: None,
            }
        };

        if !options.preserve_originals {
            remove_members(group).await;
        }

        info!(output = %result.path.display(), merged = result.merged, "Consolidated recording");
        Ok(result)
    }

    /// Check that every member exposes a decodable audio track
    pub async fn validate_for_merge(&self, group: &RecordingGroup) -> Result<(), IngestError> {
        for member in group.members() {
            self.require_track(member).await?;
        }
        Ok(())
    }

    async fn require_track(&self, member: &SourceFile) -> Result<AudioTrack, IngestError> {
        match self.codec.load_audio_track(&member.path).await {
            Ok(Some(track)) => Ok(track),
            Ok(None) => {
                warn!(file = %member.file_name, "No audio track, cannot merge group");
                Err(IngestError::InvalidInputFile(member.path.clone()))
            }
            Err(e) => {
                warn!(file = %member.file_name, error = %e, "Probe failed, cannot merge group");
                Err(IngestError::InvalidInputFile(member.path.clone()))
            }
        }
    }

    async fn merge(
        &self,
        group: &RecordingGroup,
        destination_dir: &Path,
        file_name: &str,
        format: OutputFormat,
    ) -> Result<Consolidated, IngestError> {
        // Validate everything before committing to the merge
        let mut tracks = Vec::with_capacity(group.len());
        for member in group.members() {
            tracks.push(self.require_track(member).await?);
        }

        // Every member must land in the timeline; members are deleted afterwards
        let mut parts = Vec::with_capacity(group.len());
        for (member, track) in group.members().iter().zip(tracks) {
            let duration = match self.codec.load_duration(&member.path).await {
                Ok(duration) => duration,
                Err(e) => {
                    warn!(file = %member.file_name, error = %e, "Could not read duration, cannot merge group");
                    return Err(IngestError::InvalidInputFile(member.path.clone()));
                }
            };
            parts.push(TimelinePart {
                source: member.path.clone(),
                track: Some(track),
                duration,
            });
        }

        let timeline = self.codec.concatenate(parts);
        if timeline.is_empty() {
            return Err(IngestError::NoInputFiles);
        }
        if let Some(missing) = group
            .members()
            .iter()
            .find(|m| !timeline.segments().iter().any(|s| s.source == m.path))
        {
            warn!(file = %missing.file_name, "Member left out of timeline, cannot merge group");
            return Err(IngestError::InvalidInputFile(missing.path.clone()));
        }

        let duration = timeline.total_duration();
        debug!(
            segments = timeline.segments().len(),
            duration_secs = duration.as_secs_f64(),
            "Built timeline"
        );

        let path = self
            .export_with_retry(
                &ExportSource::Timeline(timeline),
                destination_dir,
                file_name,
                format,
            )
            .await?;

        Ok(Consolidated {
            path,
            members: group.len(),
            merged: true,
            duration: Some(duration),
        })
    }

    /// Export with bounded retries; the staging file never survives a failure
    async fn export_with_retry(
        &self,
        source: &ExportSource,
        destination_dir: &Path,
        file_name: &str,
        format: OutputFormat,
    ) -> Result<PathBuf, IngestError> {
        let staging = partial_path(&destination_dir.join(file_name));
        let mut last_error = String::new();

        for attempt in 1..=MAX_EXPORT_ATTEMPTS {
            remove_if_exists(&staging).await;

            match self.codec.export(source, &staging, format).await {
                Ok(()) => match tokio::fs::metadata(&staging).await {
                    Ok(_) => return persist(&staging, destination_dir, file_name).await,
                    Err(e) => {
                        last_error = format!("export produced no output: {}", e);
                    }
                },
                Err(e) => {
                    last_error = format!("{:#}", e);
                }
            }

            warn!(attempt, max_attempts = MAX_EXPORT_ATTEMPTS, error = %last_error, "Export attempt failed");
            remove_if_exists(&staging).await;

            if attempt < MAX_EXPORT_ATTEMPTS {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(IngestError::ExportFailed {
            path: destination_dir.join(file_name),
            attempts: MAX_EXPORT_ATTEMPTS,
            message: last_error,
        })
    }

    /// Place a file that needs no transcode
    async fn place_unchanged(
        &self,
        file: &SourceFile,
        destination_dir: &Path,
        file_name: &str,
        preserve: bool,
    ) -> Result<Consolidated, IngestError> {
        let done = |path: PathBuf| Consolidated {
            path,
            members: 1,
            merged: false,
            duration: None,
        };

        if !preserve {
            let target = unique_path(destination_dir, file_name);
            match tokio::fs::rename(&file.path, &target).await {
                Ok(()) => {
                    info!(output = %target.display(), "Moved recording");
                    return Ok(done(target));
                }
                Err(e) => {
                    // Different filesystem: fall through to copy + delete
                    debug!(file = %file.file_name, error = %e, "Rename failed, copying instead");
                }
            }
        }

        let staging = partial_path(&destination_dir.join(file_name));
        remove_if_exists(&staging).await;

        let copied = tokio::fs::copy(&file.path, &staging)
            .await
            .map_err(|e| IngestError::from_io(e, &file.path));
        let copied = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                remove_if_exists(&staging).await;
                return Err(e);
            }
        };

        let expected = tokio::fs::metadata(&file.path)
            .await
            .map_err(|e| IngestError::from_io(e, &file.path))?
            .len();
        if copied != expected {
            remove_if_exists(&staging).await;
            return Err(IngestError::VerificationFailed {
                path: file.path.clone(),
                expected,
                actual: copied,
            });
        }

        let target = persist(&staging, destination_dir, file_name).await?;

        if !preserve {
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                warn!(file = %file.path.display(), error = %e, "Failed to remove moved source");
            }
        }

        info!(output = %target.display(), "Copied recording");
        Ok(done(target))
    }
}

/// Rename a finished staging file to the first free name
async fn persist(
    staging: &Path,
    destination_dir: &Path,
    file_name: &str,
) -> Result<PathBuf, IngestError> {
    let target = unique_path(destination_dir, file_name);
    if let Err(e) = tokio::fs::rename(staging, &target).await {
        remove_if_exists(staging).await;
        return Err(IngestError::from_io(e, &target));
    }
    Ok(target)
}

async fn remove_members(group: &RecordingGroup) {
    for member in group.members() {
        if let Err(e) = tokio::fs::remove_file(&member.path).await {
            warn!(file = %member.path.display(), error = %e, "Failed to remove consolidated member");
        }
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(file = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove partial output"),
    }
}
