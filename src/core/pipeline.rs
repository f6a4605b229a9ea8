//! Ingestion pipeline.
//!
//! Runs one job per mounted volume: reports the job lifecycle, drives the
//! [`TransferExecutor`] through its phases and records every notable event
//! in the [`JobJournal`]. At most one job runs at a time; a request arriving
//! while the pipeline is busy is rejected with [`IngestError::JobInProgress`].

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{JobEvent, JobEventKind, ProcessingOptions, TransferState};

use super::error::IngestError;
use super::journal::JobJournal;
use super::lock::JobLock;
use super::observer::JobObserver;
use super::transfer::{TransferExecutor, TransferReport};

/// Outcome of a finished job
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub volume: PathBuf,
    pub report: TransferReport,
}

/// Entry point for ingestion jobs
pub struct IngestionPipeline {
    executor: TransferExecutor,
    destination: PathBuf,
    options: ProcessingOptions,
    journal: Option<JobJournal>,
    lock_path: Option<PathBuf>,
    state: watch::Sender<TransferState>,
}

impl IngestionPipeline {
    pub fn new(
        executor: TransferExecutor,
        destination: impl Into<PathBuf>,
        options: ProcessingOptions,
    ) -> Self {
        let (state, _) = watch::channel(TransferState::Idle);

        Self {
            executor,
            destination: destination.into(),
            options,
            journal: None,
            lock_path: None,
            state,
        }
    }

    /// Record job events in `journal`
    pub fn with_journal(mut self, journal: JobJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Also guard jobs with a cross-process lock file
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        *self.state.borrow()
    }

    /// Receiver that sees every state change
    pub fn subscribe_state(&self) -> watch::Receiver<TransferState> {
        self.state.subscribe()
    }

    /// Ingest the recordings on `volume`.
    ///
    /// The observer receives state changes, events and per-group progress,
    /// and is closed when this returns.
    #[instrument(skip(self, observer), fields(volume = %volume.display()))]
    pub async fn run(
        &self,
        volume: &Path,
        observer: &mut JobObserver,
    ) -> Result<JobSummary, IngestError> {
        let claimed = self.state.send_if_modified(|state| {
            if state.is_idle() {
                *state = TransferState::Transferring;
                true
            } else {
                false
            }
        });
        if !claimed {
            warn!("Rejecting job, another one is running");
            observer.finish();
            return Err(IngestError::JobInProgress);
        }

        let _lock = match self.lock_path.as_deref().map(JobLock::acquire).transpose() {
            Ok(lock) => lock,
            Err(e) => {
                self.state.send_replace(TransferState::Idle);
                observer.finish();
                return Err(e);
            }
        };

        let job_id = Uuid::new_v4();
        info!(%job_id, "Starting ingestion job");

        self.record(
            observer,
            JobEvent::new(
                job_id,
                JobEventKind::DeviceDetected {
                    volume: volume.to_path_buf(),
                },
            ),
        );
        observer.state(TransferState::Transferring);

        let outcome = self.execute(job_id, volume, observer).await;

        let result = match outcome {
            Ok(report) => {
                let r = report.result;
                self.record(
                    observer,
                    JobEvent::new(
                        job_id,
                        JobEventKind::ProcessingComplete {
                            processed: r.processed,
                            merged: r.merged,
                            deleted_small: r.deleted_small,
                        },
                    ),
                );
                self.set_state(observer, TransferState::Idle);

                Ok(JobSummary {
                    job_id,
                    volume: volume.to_path_buf(),
                    report,
                })
            }
            Err(e) => {
                error!(%job_id, error = %e, "Ingestion job failed");
                self.record(
                    observer,
                    JobEvent::new(
                        job_id,
                        JobEventKind::TransferFailed {
                            message: e.to_string(),
                        },
                    ),
                );
                self.set_state(observer, TransferState::Error);
                self.set_state(observer, TransferState::Idle);
                Err(e)
            }
        };

        observer.finish();
        result
    }

    async fn execute(
        &self,
        job_id: Uuid,
        volume: &Path,
        observer: &mut JobObserver,
    ) -> Result<TransferReport, IngestError> {
        let Some(plan) = self.executor.prepare(volume, &self.destination).await? else {
            return Ok(TransferReport::default());
        };

        self.record(
            observer,
            JobEvent::new(job_id, JobEventKind::TransferStarted { count: plan.len() }),
        );

        let staged = self.executor.stage(plan).await;

        self.record(
            observer,
            JobEvent::new(
                job_id,
                JobEventKind::TransferSucceeded {
                    count: staged.len(),
                },
            ),
        );

        self.set_state(observer, TransferState::Processing);

        Ok(self
            .executor
            .process(staged, &self.destination, &self.options, observer)
            .await)
    }

    fn set_state(&self, observer: &mut JobObserver, next: TransferState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Unexpected state transition");
        }
        self.state.send_replace(next);
        observer.state(next);
    }

    /// Deliver an event to the observer and the journal; journal failures
    /// never affect the job
    fn record(&self, observer: &mut JobObserver, event: JobEvent) {
        info!(event = %event.summary, "Job event");

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&event) {
                warn!(error = %e, "Failed to write job journal");
            }
        }

        observer.event(event);
    }
}
