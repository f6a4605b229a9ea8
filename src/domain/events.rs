//! Job events.
//!
//! Notification-worthy moments of an ingestion job are recorded as immutable
//! events in an append-only journal; job history is rebuilt by replaying them.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single event in the job journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The job this event belongs to
    pub job_id: Uuid,

    /// What happened
    pub kind: JobEventKind,

    /// Human-readable summary
    pub summary: String,
}

impl JobEvent {
    /// Create a new event with the current timestamp
    pub fn new(job_id: Uuid, kind: JobEventKind) -> Self {
        let summary = kind.describe();
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            job_id,
            kind,
            summary,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    /// A volume was mounted and handed to the pipeline
    DeviceDetected { volume: PathBuf },

    /// Staging began for `count` files
    TransferStarted { count: usize },

    /// `count` files were staged and verified
    TransferSucceeded { count: usize },

    /// Consolidation finished
    ProcessingComplete {
        processed: usize,
        merged: usize,
        deleted_small: usize,
    },

    /// The job failed
    TransferFailed { message: String },
}

impl JobEventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::DeviceDetected { .. } => EventType::DeviceDetected,
            Self::TransferStarted { .. } => EventType::TransferStarted,
            Self::TransferSucceeded { .. } => EventType::TransferSucceeded,
            Self::ProcessingComplete { .. } => EventType::ProcessingComplete,
            Self::TransferFailed { .. } => EventType::TransferFailed,
        }
    }

    /// Short message suitable for a notification
    pub fn describe(&self) -> String {
        match self {
            Self::DeviceDetected { volume } => {
                format!("Recorder detected at {}", volume.display())
            }
            Self::TransferStarted { count } => {
                format!("Transferring {} {}", count, plural(*count, "recording"))
            }
            Self::TransferSucceeded { count } => {
                format!("Transferred {} {}", count, plural(*count, "recording"))
            }
            Self::ProcessingComplete {
                processed,
                merged,
                deleted_small,
            } => format!(
                "Processed {} {} ({} merged, {} small deleted)",
                processed,
                plural(*processed, "recording"),
                merged,
                deleted_small
            ),
            Self::TransferFailed { message } => format!("Transfer failed: {}", message),
        }
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

/// Discriminant of [`JobEventKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DeviceDetected,
    TransferStarted,
    TransferSucceeded,
    ProcessingComplete,
    TransferFailed,
}
