//! Volume-side ingestion plumbing.
//!
//! 1. **Scanner**: enumerates the raw recordings on a mounted volume
//! 2. **VolumeWatcher**: reports volumes as they are mounted
//!
//! ```text
//! /Volumes/<name> → VolumeWatcher → IngestionPipeline::run
//!                                         ↓
//!                                  VolumeScanner::scan
//! ```

pub mod scanner;
pub mod volume_watcher;

// Re-export key types
pub use scanner::VolumeScanner;
pub use volume_watcher::{
    list_volumes, VolumeMounted, VolumeWatcher, VolumeWatcherConfig, WatchHandle, WatcherError,
};
