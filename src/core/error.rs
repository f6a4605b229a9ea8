//! Typed failure conditions raised by the ingestion core.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced by the ingestion core
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("No files to process")]
    NoFilesToProcess,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Insufficient space at destination: {required} bytes required, {available} available")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Copy failed for {path}: {message}")]
    CopyFailed { path: PathBuf, message: String },

    #[error("Verification failed for {path}: expected {expected} bytes, found {actual}")]
    VerificationFailed {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Checksum mismatch for {path}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Invalid input file (no decodable audio): {0}")]
    InvalidInputFile(PathBuf),

    #[error("Export failed for {path} after {attempts} attempts: {message}")]
    ExportFailed {
        path: PathBuf,
        attempts: u32,
        message: String,
    },

    #[error("No input files")]
    NoInputFiles,

    #[error("Another ingestion job is already running")]
    JobInProgress,
}

impl IngestError {
    /// Classify an I/O error that happened while handling `path`
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::CopyFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    /// Whole-job conditions: nothing is staged or deleted when these occur
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationError(_) | Self::InsufficientSpace { .. } | Self::JobInProgress
        )
    }
}
