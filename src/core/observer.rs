//! Job progress reporting.
//!
//! A job reports through a [`JobObserver`] handed to it by the caller. Updates
//! travel over an unbounded channel in the order they were produced; progress
//! fractions never go backwards within a job and nothing is delivered after
//! [`JobObserver::finish`].

use tokio::sync::mpsc;

use crate::domain::{JobEvent, TransferState};

/// An update delivered to the job's caller
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// The pipeline changed state
    State(TransferState),

    /// A group was processed
    Progress { label: String, fraction: f64 },

    /// A notification-worthy event
    Event(JobEvent),
}

/// Sending half held by a running job
#[derive(Debug, Default)]
pub struct JobObserver {
    tx: Option<mpsc::UnboundedSender<JobUpdate>>,
    last_fraction: f64,
}

impl JobObserver {
    /// Create an observer and the receiver the caller listens on
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                last_fraction: 0.0,
            },
            rx,
        )
    }

    /// Observer that discards everything
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn state(&mut self, state: TransferState) {
        self.send(JobUpdate::State(state));
    }

    /// Report progress; the fraction is clamped to `[0, 1]` and never
    /// decreases
    pub fn progress(&mut self, label: impl Into<String>, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.last_fraction = self.last_fraction.max(fraction);
        let fraction = self.last_fraction;
        self.send(JobUpdate::Progress {
            label: label.into(),
            fraction,
        });
    }

    pub fn event(&mut self, event: JobEvent) {
        self.send(JobUpdate::Event(event));
    }

    /// Close the channel; later updates are dropped
    pub fn finish(&mut self) {
        self.tx = None;
    }

    pub fn is_finished(&self) -> bool {
        self.tx.is_none()
    }

    fn send(&mut self, update: JobUpdate) {
        if let Some(tx) = &self.tx {
            // Receiver gone: caller stopped listening, keep the job running
            if tx.send(update).is_err() {
                self.tx = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_is_monotonic_and_clamped() {
        let (mut observer, mut rx) = JobObserver::channel();

        observer.progress("a", 0.5);
        observer.progress("b", 0.25);
        observer.progress("c", 7.0);
        observer.finish();

        let mut fractions = Vec::new();
        while let Some(update) = rx.recv().await {
            if let JobUpdate::Progress { fraction, .. } = update {
                fractions.push(fraction);
            }
        }
        assert_eq!(fractions, vec![0.5, 0.5, 1.0]);
    }

    #[tokio::test]
    async fn test_nothing_delivered_after_finish() {
        let (mut observer, mut rx) = JobObserver::channel();

        observer.state(TransferState::Transferring);
        observer.finish();
        observer.state(TransferState::Idle);

        assert!(matches!(
            rx.recv().await,
            Some(JobUpdate::State(TransferState::Transferring))
        ));
        assert!(rx.recv().await.is_none());
        assert!(observer.is_finished());
    }
}
