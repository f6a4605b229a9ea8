//! Domain types for reclift.
//!
//! This module contains the core data structures:
//! - Recording: discovered files and recording groups
//! - Options: per-job processing options
//! - Events: journal entries for notification-worthy moments
//! - Job: lifecycle state, result counters and job history

pub mod events;
pub mod job;
pub mod options;
pub mod recording;

// Re-export commonly used types
pub use events::{EventType, JobEvent, JobEventKind};
pub use job::{JobOutcome, JobRecord, TransferResult, TransferState};
pub use options::{OutputFormat, ProcessingOptions};
pub use recording::{RecordingGroup, SourceFile};
