//! Append-only job journal.
//!
//! Job events are stored as newline-delimited JSON (JSONL) so the history
//! survives restarts and can be inspected with standard tools. Writers take
//! an exclusive lock on the file while appending.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::domain::{JobEvent, JobRecord};

/// File-backed journal of job events
#[derive(Debug, Clone)]
pub struct JobJournal {
    path: PathBuf,
}

impl JobJournal {
    /// Open the journal at `path`, creating its parent directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create journal directory: {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event under an exclusive file lock
    pub fn append(&self, event: &JobEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;

        file.lock_exclusive()
            .context("Failed to acquire file lock on journal")?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        writeln!(file, "{}", json).context("Failed to write event")?;
        file.flush().context("Failed to flush event")?;

        // Lock is released when file is dropped
        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<JobEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: JobEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Events belonging to one job
    pub async fn events_for(&self, job_id: Uuid) -> Result<Vec<JobEvent>> {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(|e| e.job_id == job_id).collect())
    }

    /// Reconstruct every job, most recent first
    pub async fn jobs(&self) -> Result<Vec<JobRecord>> {
        let events = self.replay().await?;

        // Preserve first-seen order of job ids
        let mut order: Vec<Uuid> = Vec::new();
        for event in &events {
            if !order.contains(&event.job_id) {
                order.push(event.job_id);
            }
        }

        let mut jobs: Vec<JobRecord> = order
            .into_iter()
            .filter_map(|id| {
                let job_events: Vec<JobEvent> =
                    events.iter().filter(|e| e.job_id == id).cloned().collect();
                JobRecord::from_events(&job_events)
            })
            .collect();

        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(jobs)
    }
}
