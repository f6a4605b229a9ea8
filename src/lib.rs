//! reclift - Recorder ingestion and consolidation
//!
//! Moves recordings off removable volumes, reassembles recordings that the
//! device split into fragments, drops accidental short takes and writes one
//! output file per recording into a destination folder.
//!
//! # Architecture
//!
//! A job per mounted volume:
//! - Recordings are staged into a scratch area and verified
//! - Staged copies are filtered, grouped and consolidated into the destination
//! - Originals are deleted only after their data is secured
//! - Every job is recorded as events in a JSONL journal
//!
//! # Modules
//!
//! - `adapters`: Audio codec integration (ffmpeg)
//! - `core`: Classifier, consolidator, transfer executor, pipeline
//! - `domain`: Data structures (SourceFile, RecordingGroup, JobEvent)
//! - `ingest`: Volume scanning and mount watching
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Ingest a mounted recorder
//! reclift ingest /Volumes/DJI_MIC --destination ~/Recordings
//!
//! # Preview how a folder would be grouped
//! reclift group /Volumes/DJI_MIC
//!
//! # Ingest every recorder as it is plugged in
//! reclift watch
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;

// Re-export main types at crate root for convenience
pub use adapters::{AudioCodec, FfmpegCodec};
pub use core::{
    AudioConsolidator, ClassifierConfig, IngestError, IngestionPipeline, JobObserver,
    TransferExecutor,
};
pub use domain::{
    OutputFormat, ProcessingOptions, RecordingGroup, SourceFile, TransferResult, TransferState,
};
