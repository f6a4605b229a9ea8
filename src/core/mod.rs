//! Core ingestion logic.
//!
//! This module contains:
//! - Classifier: grouping split fragments into logical recordings
//! - Filter: removal of accidental short recordings
//! - Consolidator: merge/transcode with bounded retry
//! - TransferExecutor: stage, verify, process and clean up a volume
//! - IngestionPipeline: one job per volume, with journal and state reporting

pub mod classifier;
pub mod consolidator;
pub mod error;
pub mod filter;
pub mod journal;
pub mod lock;
pub mod naming;
pub mod observer;
pub mod pipeline;
pub mod transfer;

// Re-export commonly used types
pub use classifier::{group_recordings, ClassifierConfig};
pub use consolidator::{AudioConsolidator, Consolidated, EXPORT_RETRY_DELAY, MAX_EXPORT_ATTEMPTS};
pub use error::IngestError;
pub use filter::{filter_small_files, FilterOutcome};
pub use journal::JobJournal;
pub use lock::JobLock;
pub use naming::unique_path;
pub use observer::{JobObserver, JobUpdate};
pub use pipeline::{IngestionPipeline, JobSummary};
pub use transfer::{
    FileCopier, FileFailure, SpaceProbe, TokioCopier, TransferExecutor, TransferReport,
    TransferSettings,
};
