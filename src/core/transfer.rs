//! Transfer executor.
//!
//! Moves recordings off a source volume in three phases:
//!
//! 1. **prepare**: scan the volume, check destination capacity and open a
//!    scratch directory inside the destination
//! 2. **stage**: copy every recording into the scratch directory and verify
//!    each copy (exact size, optionally SHA-256)
//! 3. **process**: filter, classify and consolidate the staged copies into
//!    the destination, then delete the originals whose data is secured
//!
//! A source file is only deleted once its data exists at the destination
//! (consolidated output or raw fallback copy) or it was removed as too small.
//! Whole-job conditions fail before anything is copied.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::domain::{ProcessingOptions, RecordingGroup, SourceFile, TransferResult, TransferState};
use crate::ingest::VolumeScanner;

use super::classifier::{group_recordings, ClassifierConfig};
use super::consolidator::AudioConsolidator;
use super::error::IngestError;
use super::filter::filter_small_files;
use super::naming::unique_path;
use super::observer::JobObserver;

/// Prefix of the per-job scratch directory created inside the destination
pub const STAGING_PREFIX: &str = ".reclift-staging-";

fn default_verify_delay_ms() -> u64 {
    100
}

/// Transfer behaviour from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Compare SHA-256 digests after the size check
    #[serde(default)]
    pub verify_checksums: bool,

    /// Pause between a copy and its verification
    #[serde(default = "default_verify_delay_ms")]
    pub verify_delay_ms: u64,

    /// Globs (relative to the volume root) that are never transferred
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            verify_delay_ms: default_verify_delay_ms(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Byte copy between two paths
#[async_trait]
pub trait FileCopier: Send + Sync {
    /// Copy `from` to `to`, returning the number of bytes written
    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

/// Copier backed by `tokio::fs::copy`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCopier;

#[async_trait]
impl FileCopier for TokioCopier {
    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        tokio::fs::copy(from, to).await
    }
}

/// Reports free bytes on the volume holding a path
pub type SpaceProbe = Arc<dyn Fn(&Path) -> io::Result<u64> + Send + Sync>;

/// A file that could not be transferred or consolidated
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: IngestError,
}

/// Counters plus the individual failures behind `skipped`/`errored`
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    pub result: TransferResult,
    pub failures: Vec<FileFailure>,
}

/// Output of the prepare phase
pub struct TransferPlan {
    files: Vec<SourceFile>,
    scratch: TempDir,
}

impl TransferPlan {
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

/// A verified copy in the scratch directory and the original it came from
#[derive(Debug, Clone)]
struct StagedFile {
    original: SourceFile,
    staged: SourceFile,
}

/// Output of the stage phase
pub struct StagedTransfer {
    files: Vec<StagedFile>,
    scratch: TempDir,
    failures: Vec<FileFailure>,
}

impl StagedTransfer {
    /// Number of files staged and verified
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn failures(&self) -> &[FileFailure] {
        &self.failures
    }
}

/// Executes one transfer job from a source volume to a destination folder
pub struct TransferExecutor {
    consolidator: AudioConsolidator,
    classifier: ClassifierConfig,
    settings: TransferSettings,
    scanner: VolumeScanner,
    copier: Arc<dyn FileCopier>,
    space_probe: SpaceProbe,
}

impl TransferExecutor {
    pub fn new(
        consolidator: AudioConsolidator,
        classifier: ClassifierConfig,
        settings: TransferSettings,
    ) -> Self {
        let scanner = VolumeScanner::new(classifier.raw_extension.clone(), &settings.exclude_patterns);

        Self {
            consolidator,
            classifier,
            settings,
            scanner,
            copier: Arc::new(TokioCopier),
            space_probe: Arc::new(|path: &Path| fs2::available_space(path)),
        }
    }

    /// Replace the copier used for staging
    pub fn with_copier(mut self, copier: Arc<dyn FileCopier>) -> Self {
        self.copier = copier;
        self
    }

    /// Replace the free-space check
    pub fn with_space_probe(mut self, probe: SpaceProbe) -> Self {
        self.space_probe = probe;
        self
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn consolidator(&self) -> &AudioConsolidator {
        &self.consolidator
    }

    /// Run a whole job: prepare, stage and process.
    ///
    /// State changes are reported on `observer`; an empty volume returns a
    /// zero report without reaching the processing state.
    pub async fn transfer(
        &self,
        source_root: &Path,
        destination_dir: &Path,
        options: &ProcessingOptions,
        observer: &mut JobObserver,
    ) -> Result<TransferReport, IngestError> {
        let Some(plan) = self.prepare(source_root, destination_dir).await? else {
            return Ok(TransferReport::default());
        };

        observer.state(TransferState::Transferring);
        let staged = self.stage(plan).await;

        observer.state(TransferState::Processing);
        Ok(self.process(staged, destination_dir, options, observer).await)
    }

    /// Scan the volume and reserve a scratch area.
    ///
    /// Returns `None` when the volume holds no recordings. Fails without
    /// copying anything when the destination is unusable or too small.
    #[instrument(skip_all, fields(source = %source_root.display()))]
    pub async fn prepare(
        &self,
        source_root: &Path,
        destination_dir: &Path,
    ) -> Result<Option<TransferPlan>, IngestError> {
        validate_destination(destination_dir).await?;

        let files = self.scanner.scan_async(source_root).await?;
        if files.is_empty() {
            info!("No recordings found on volume");
            return Ok(None);
        }

        let required: u64 = files.iter().map(|f| f.size).sum();
        let available = (self.space_probe)(destination_dir).map_err(|e| {
            IngestError::ConfigurationError(format!(
                "Cannot determine free space at {}: {}",
                destination_dir.display(),
                e
            ))
        })?;

        if required > available {
            warn!(required, available, "Not enough space at destination");
            return Err(IngestError::InsufficientSpace {
                required,
                available,
            });
        }

        let scratch = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(destination_dir)
            .map_err(|e| destination_error(e, destination_dir))?;

        info!(files = files.len(), bytes = required, "Prepared transfer");
        Ok(Some(TransferPlan { files, scratch }))
    }

    /// Copy and verify every planned file into the scratch directory.
    ///
    /// A file that fails to copy or verify is recorded and left untouched on
    /// the source volume.
    #[instrument(skip_all, fields(files = plan.len()))]
    pub async fn stage(&self, plan: TransferPlan) -> StagedTransfer {
        let TransferPlan { files, scratch } = plan;
        let mut staged = Vec::with_capacity(files.len());
        let mut failures = Vec::new();

        for file in files {
            match self.stage_file(&file, scratch.path()).await {
                Ok(path) => {
                    debug!(file = %file.file_name, staged = %path.display(), "Staged recording");
                    staged.push(StagedFile {
                        staged: file.relocated(path),
                        original: file,
                    });
                }
                Err(error) => {
                    warn!(file = %file.path.display(), error = %error, "Failed to stage recording");
                    failures.push(FileFailure {
                        path: file.path.clone(),
                        error,
                    });
                }
            }
        }

        info!(staged = staged.len(), failed = failures.len(), "Staging complete");
        StagedTransfer {
            files: staged,
            scratch,
            failures,
        }
    }

    /// Consolidate staged files into the destination and retire originals.
    ///
    /// When no group yields an output at all, the staged files are moved
    /// into the destination raw instead.
    #[instrument(skip_all, fields(staged = staged.len()))]
    pub async fn process(
        &self,
        staged: StagedTransfer,
        destination_dir: &Path,
        options: &ProcessingOptions,
        observer: &mut JobObserver,
    ) -> TransferReport {
        let StagedTransfer {
            files,
            scratch,
            mut failures,
        } = staged;

        let mut result = TransferResult {
            transferred: files.len(),
            errored: failures.len(),
            ..TransferResult::default()
        };

        // Staged paths whose data no longer needs the original
        let mut secured: HashSet<PathBuf> = HashSet::new();

        let staged_files: Vec<SourceFile> = files.iter().map(|f| f.staged.clone()).collect();
        let outcome = self
            .consolidate_all(
                staged_files,
                destination_dir,
                options,
                observer,
                &mut result,
                &mut secured,
                &mut failures,
            )
            .await;

        if let Err(e) = outcome {
            warn!(error = %e, "Processing failed, moving raw recordings to destination");
            failures.push(FileFailure {
                path: destination_dir.to_path_buf(),
                error: e,
            });
            self.move_raw(&files, destination_dir, &mut result, &mut secured)
                .await;
        }

        if !options.preserve_originals {
            delete_originals(&files, &secured).await;
        }

        if let Err(e) = scratch.close() {
            warn!(error = %e, "Failed to remove staging directory");
        }

        info!(
            transferred = result.transferred,
            processed = result.processed,
            merged = result.merged,
            deleted_small = result.deleted_small,
            skipped = result.skipped,
            errored = result.errored,
            "Transfer complete"
        );

        TransferReport { result, failures }
    }

    async fn stage_file(&self, file: &SourceFile, scratch: &Path) -> Result<PathBuf, IngestError> {
        let target = unique_path(scratch, &file.file_name);

        if let Err(e) = self.copier.copy(&file.path, &target).await {
            discard(&target).await;
            return Err(IngestError::from_io(e, &file.path));
        }

        if self.settings.verify_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.verify_delay_ms)).await;
        }

        if let Err(e) = self.verify_copy(&file.path, &target).await {
            discard(&target).await;
            return Err(e);
        }

        Ok(target)
    }

    /// Confirm the copy exists and matches the source byte for byte in size
    /// (and digest when enabled)
    async fn verify_copy(&self, source: &Path, copy: &Path) -> Result<(), IngestError> {
        let expected = tokio::fs::metadata(source)
            .await
            .map_err(|e| IngestError::from_io(e, source))?
            .len();

        let actual = match tokio::fs::metadata(copy).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(IngestError::from_io(e, copy)),
        };

        if expected != actual || !copy.exists() {
            return Err(IngestError::VerificationFailed {
                path: source.to_path_buf(),
                expected,
                actual,
            });
        }

        if self.settings.verify_checksums {
            let expected = sha256_file(source).await?;
            let actual = sha256_file(copy).await?;
            if expected != actual {
                return Err(IngestError::ChecksumMismatch {
                    path: source.to_path_buf(),
                    expected,
                    actual,
                });
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn consolidate_all(
        &self,
        files: Vec<SourceFile>,
        destination_dir: &Path,
        options: &ProcessingOptions,
        observer: &mut JobObserver,
        result: &mut TransferResult,
        secured: &mut HashSet<PathBuf>,
        failures: &mut Vec<FileFailure>,
    ) -> Result<(), IngestError> {
        let filtered = filter_small_files(
            files,
            options.small_file_threshold_bytes,
            options.delete_small_files,
        )
        .await;

        result.deleted_small = filtered.removed.len();
        secured.extend(filtered.removed.into_iter().map(|f| f.path));

        let groups = if options.merge_enabled {
            group_recordings(&filtered.kept, &self.classifier)
        } else {
            let mut kept = filtered.kept;
            kept.sort_by(|a, b| a.file_name.cmp(&b.file_name));
            kept.into_iter().map(RecordingGroup::single).collect()
        };

        let total = groups.len();
        let failures_before = failures.len();
        for (index, group) in groups.into_iter().enumerate() {
            let label = group.base_name().to_string();

            match self.consolidator.consolidate(&group, destination_dir, options).await {
                Ok(output) => {
                    result.processed += 1;
                    if output.merged {
                        result.merged += 1;
                    }
                    secured.extend(group.members().iter().map(|m| m.path.clone()));
                }
                Err(IngestError::InvalidInputFile(path)) if group.is_merge() => {
                    warn!(group = %label, file = %path.display(), "Merge rejected, processing files individually");
                    self.consolidate_individually(group, destination_dir, options, result, secured, failures)
                        .await;
                }
                Err(e) => {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(group = %label, error = %e, "Group failed, skipping");
                    result.skipped += group.len();
                    failures.push(FileFailure {
                        path: group.first().path.clone(),
                        error: e,
                    });
                }
            }

            observer.progress(label, (index + 1) as f64 / total as f64);
        }

        // Nothing came out of any group: the codec itself is unusable
        if total > 0 && result.processed == 0 && failures.len() > failures_before {
            let last = failures[failures.len() - 1].error.clone();
            failures.truncate(failures_before);
            result.skipped = 0;
            return Err(last);
        }

        Ok(())
    }

    async fn consolidate_individually(
        &self,
        group: RecordingGroup,
        destination_dir: &Path,
        options: &ProcessingOptions,
        result: &mut TransferResult,
        secured: &mut HashSet<PathBuf>,
        failures: &mut Vec<FileFailure>,
    ) {
        for member in group.into_members() {
            let path = member.path.clone();
            let single = RecordingGroup::single(member);

            match self.consolidator.consolidate(&single, destination_dir, options).await {
                Ok(_) => {
                    result.processed += 1;
                    secured.insert(path);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Recording failed, skipping");
                    result.skipped += 1;
                    failures.push(FileFailure { path, error: e });
                }
            }
        }
    }

    /// Fallback: move whatever is still staged into the destination as-is
    async fn move_raw(
        &self,
        files: &[StagedFile],
        destination_dir: &Path,
        result: &mut TransferResult,
        secured: &mut HashSet<PathBuf>,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(destination_dir).await {
            warn!(error = %e, "Cannot recreate destination, originals are kept");
            return;
        }

        for file in files {
            let staged = &file.staged.path;
            if secured.contains(staged) || !staged.exists() {
                continue;
            }

            let target = unique_path(destination_dir, &file.staged.file_name);
            match move_file(staged, &target).await {
                Ok(()) => {
                    info!(output = %target.display(), "Moved raw recording");
                    result.processed += 1;
                    secured.insert(staged.clone());
                }
                Err(e) => {
                    warn!(file = %staged.display(), error = %e, "Failed to move raw recording");
                }
            }
        }
    }
}

async fn validate_destination(destination_dir: &Path) -> Result<(), IngestError> {
    if destination_dir.as_os_str().is_empty() {
        return Err(IngestError::ConfigurationError(
            "No destination folder configured".to_string(),
        ));
    }

    tokio::fs::create_dir_all(destination_dir)
        .await
        .map_err(|e| destination_error(e, destination_dir))?;

    let metadata = tokio::fs::metadata(destination_dir)
        .await
        .map_err(|e| destination_error(e, destination_dir))?;
    if !metadata.is_dir() {
        return Err(IngestError::ConfigurationError(format!(
            "Destination is not a directory: {}",
            destination_dir.display()
        )));
    }

    if metadata.permissions().readonly() {
        return Err(IngestError::PermissionDenied(destination_dir.to_path_buf()));
    }

    Ok(())
}

fn destination_error(err: io::Error, destination_dir: &Path) -> IngestError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => IngestError::PermissionDenied(destination_dir.to_path_buf()),
        _ => IngestError::ConfigurationError(format!(
            "Destination {} is unusable: {}",
            destination_dir.display(),
            err
        )),
    }
}

/// Best-effort deletion of originals whose staged copy was secured
async fn delete_originals(files: &[StagedFile], secured: &HashSet<PathBuf>) {
    for file in files.iter().filter(|f| secured.contains(&f.staged.path)) {
        match tokio::fs::remove_file(&file.original.path).await {
            Ok(()) => debug!(file = %file.original.path.display(), "Removed original"),
            Err(e) => {
                warn!(file = %file.original.path.display(), error = %e, "Failed to remove original")
            }
        }
    }
}

async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(file = %path.display(), error = %e, "Failed to remove rejected copy");
        }
    }
}

/// Hex SHA-256 digest of a file, computed on the blocking pool
async fn sha256_file(path: &Path) -> Result<String, IngestError> {
    let owned = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || -> io::Result<String> {
        let mut file = std::fs::File::open(&owned)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| IngestError::CopyFailed {
        path: path.to_path_buf(),
        message: format!("Checksum task failed: {}", e),
    })?;

    digest.map_err(|e| IngestError::from_io(e, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_defaults() {
        let settings: TransferSettings = serde_yaml::from_str("verify_checksums: true").unwrap();
        assert!(settings.verify_checksums);
        assert_eq!(settings.verify_delay_ms, 100);
        assert!(settings.exclude_patterns.is_empty());
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.wav");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let digest = sha256_file(&path).await.unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_validate_destination_creates_missing_dir() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out/nested");

        validate_destination(&dest).await.unwrap();
        assert!(dest.is_dir());
    }

    #[tokio::test]
    async fn test_validate_destination_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        tokio::fs::write(&file, b"x").await.unwrap();

        let err = validate_destination(&file).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
