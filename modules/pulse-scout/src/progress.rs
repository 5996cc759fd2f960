//! One-way progress channel from the run worker to whoever presents it.
//!
//! Bounded `mpsc`: `report` waits for capacity, so messages arrive in the
//! order they were produced. A presenter that went away is not an error;
//! the run keeps going and messages only reach the log. Once the attached
//! cancellation token fires, a report that would wait for capacity is
//! dropped instead.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pipeline::RunPhase;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub phase: RunPhase,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Progress {
    tx: Option<mpsc::Sender<ProgressUpdate>>,
    cancel: Option<CancellationToken>,
}

impl Progress {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx: Some(tx),
                cancel: None,
            },
            rx,
        )
    }

    /// Progress that only goes to the log.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            cancel: None,
        }
    }

    /// Stop waiting on a full channel once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn report(&self, phase: RunPhase, message: impl Into<String>) {
        let message = message.into();
        info!(phase = %phase, "{message}");

        let Some(tx) = &self.tx else {
            return;
        };
        let update = ProgressUpdate { phase, message };
        let sent = match &self.cancel {
            Some(cancel) => tokio::select! {
                biased;
                sent = tx.send(update) => sent,
                _ = cancel.cancelled() => {
                    debug!("Run cancelled with progress channel full, update dropped");
                    return;
                }
            },
            None => tx.send(update).await,
        };
        if sent.is_err() {
            debug!("Progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_common::FailureKind;

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (progress, mut rx) = Progress::channel(2);
        let producer = tokio::spawn(async move {
            for i in 0..10 {
                progress.report(RunPhase::Harvesting, format!("step {i}")).await;
            }
        });

        let mut seen = Vec::new();
        while let Some(update) = rx.recv().await {
            seen.push(update.message);
        }
        producer.await.unwrap();

        let expected: Vec<String> = (0..10).map(|i| format!("step {i}")).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_full_channel() {
        let cancel = CancellationToken::new();
        let (progress, mut rx) = Progress::channel(1);
        let progress = progress.with_cancel(cancel.clone());
        progress.report(RunPhase::Harvesting, "fills the buffer").await;

        cancel.cancel();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            progress.report(RunPhase::Failed(FailureKind::Cancelled), "Run failed: cancelled"),
        )
        .await
        .unwrap();

        assert_eq!(rx.recv().await.unwrap().message, "fills the buffer");
        drop(progress);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_report_still_delivers_when_there_is_room() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (progress, mut rx) = Progress::channel(4);
        progress
            .with_cancel(cancel)
            .report(RunPhase::Failed(FailureKind::Cancelled), "Run failed: cancelled")
            .await;
        assert_eq!(rx.recv().await.unwrap().message, "Run failed: cancelled");
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_block() {
        let (progress, rx) = Progress::channel(1);
        drop(rx);
        progress.report(RunPhase::Classifying, "first").await;
        progress.report(RunPhase::Classifying, "second").await;
    }
}
