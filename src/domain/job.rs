//! Job lifecycle, result counters and history reconstruction.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{JobEvent, JobEventKind};

/// Lifecycle of the (single) active ingestion job.
///
/// `Idle -> Transferring -> Processing -> Idle` on success; any state may
/// fall into `Error`, which returns to `Idle` once reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    #[default]
    Idle,
    Transferring,
    Processing,
    Error,
}

impl TransferState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Idle, Transferring)
                | (Transferring, Processing)
                | (Transferring, Idle)
                | (Processing, Idle)
                | (Idle, Error)
                | (Transferring, Error)
                | (Processing, Error)
                | (Error, Idle)
        )
    }

    pub fn is_idle(self) -> bool {
        self == TransferState::Idle
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Transferring => write!(f, "transferring"),
            Self::Processing => write!(f, "processing"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Summary counters for one job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Files staged and verified
    pub transferred: usize,

    /// Output files emitted to the destination
    pub processed: usize,

    /// Outputs that came from multi-file groups
    pub merged: usize,

    /// Files removed by the small-file filter
    pub deleted_small: usize,

    /// Files whose group failed entirely
    pub skipped: usize,

    /// Files that failed staging or verification
    pub errored: usize,
}

impl TransferResult {
    /// True when the job found nothing to do
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Final outcome of a job as seen in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobOutcome {
    Running,
    Completed,
    Failed { error: String },
}

/// A past job, rebuilt from its journal events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub volume: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: JobOutcome,
    pub transferred: usize,
    pub processed: usize,
    pub merged: usize,
    pub deleted_small: usize,
}

impl JobRecord {
    /// Reconstruct a job from its events (in journal order)
    pub fn from_events(events: &[JobEvent]) -> Option<Self> {
        let first = events.first()?;

        let mut record = Self {
            id: first.job_id,
            volume: None,
            started_at: first.timestamp,
            completed_at: None,
            outcome: JobOutcome::Running,
            transferred: 0,
            processed: 0,
            merged: 0,
            deleted_small: 0,
        };

        let id = record.id;
        for event in events.iter().filter(|e| e.job_id == id) {
            record.apply_event(event);
        }

        Some(record)
    }

    /// Apply a single event
    pub fn apply_event(&mut self, event: &JobEvent) {
        match &event.kind {
            JobEventKind::DeviceDetected { volume } => {
                self.volume = Some(volume.clone());
                self.started_at = event.timestamp;
            }
            JobEventKind::TransferStarted { .. } => {}
            JobEventKind::TransferSucceeded { count } => {
                self.transferred = *count;
            }
            JobEventKind::ProcessingComplete {
                processed,
                merged,
                deleted_small,
            } => {
                self.processed = *processed;
                self.merged = *merged;
                self.deleted_small = *deleted_small;
                self.outcome = JobOutcome::Completed;
                self.completed_at = Some(event.timestamp);
            }
            JobEventKind::TransferFailed { message } => {
                self.outcome = JobOutcome::Failed {
                    error: message.clone(),
                };
                self.completed_at = Some(event.timestamp);
            }
        }
    }
}
