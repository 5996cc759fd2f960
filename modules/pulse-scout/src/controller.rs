use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pulse_common::PulseError;

use crate::pipeline::{Pipeline, RunOutcome};
use crate::progress::{Progress, ProgressUpdate};

/// Starts harvesting runs off the caller's thread, at most one at a time.
#[derive(Debug, Clone)]
pub struct RunController {
    active: Arc<AtomicBool>,
    progress_buffer: usize,
}

/// Clears the run lock when the worker exits, however it exits.
struct RunLock(Arc<AtomicBool>);

impl Drop for RunLock {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RunController {
    pub fn new(progress_buffer: usize) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            progress_buffer,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawn the run in a dedicated thread with its own runtime and return
    /// immediately. Fails with `RunInProgress` while another run is active.
    pub fn start(&self, mut pipeline: Pipeline, url: String) -> Result<RunHandle, PulseError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PulseError::RunInProgress);
        }
        let lock = RunLock(self.active.clone());

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let (progress, progress_rx) = Progress::channel(self.progress_buffer);
        let progress = progress.with_cancel(cancel.clone());
        let (outcome_tx, outcome_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("pulse-run".to_string())
            .spawn(move || {
                let result = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt.block_on(async {
                        info!(url = %url, "Harvesting run starting");
                        let result = pipeline.run(&url, &progress, &worker_cancel).await;
                        pipeline.close().await;
                        result
                    }),
                    Err(e) => {
                        error!(error = %e, "Failed to create run runtime");
                        Err(PulseError::Anyhow(
                            anyhow::Error::new(e).context("Failed to create run runtime"),
                        ))
                    }
                };

                // Closes the progress stream before the outcome is delivered.
                drop(progress);
                drop(lock);
                let _ = outcome_tx.send(result);
            })
            .map_err(|e| {
                PulseError::Anyhow(anyhow::Error::new(e).context("Failed to spawn run worker"))
            })?;

        Ok(RunHandle {
            progress: progress_rx,
            cancel,
            outcome: outcome_rx,
        })
    }
}

/// The caller's side of a running harvest.
pub struct RunHandle {
    pub progress: mpsc::Receiver<ProgressUpdate>,
    cancel: CancellationToken,
    outcome: oneshot::Receiver<Result<RunOutcome, PulseError>>,
}

impl RunHandle {
    /// Ask the worker to stop at its next wait point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run's final result. Undrained progress is discarded.
    pub async fn finish(self) -> Result<RunOutcome, PulseError> {
        let RunHandle {
            progress, outcome, ..
        } = self;
        drop(progress);
        outcome.await.map_err(|_| {
            PulseError::Anyhow(anyhow::anyhow!("Run worker exited without a result"))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::traits::SentimentModel;

    fn pipeline(page: MockPage, config: &pulse_common::Config) -> Pipeline {
        let model: Arc<dyn SentimentModel> =
            Arc::new(MockModel::new().default_prediction("Positive", 0.9));
        Pipeline::from_config(config, Box::new(page), model, Box::new(RecordingSink::new()))
            .unwrap()
    }

    fn config_in(dir: &tempfile::TempDir) -> pulse_common::Config {
        let mut config = test_config();
        config.session.path = dir.path().join("session.json");
        config
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.login.poll_interval_secs = 1;
        let controller = RunController::new(8);

        // Never logs in, so the first run blocks in the login wait.
        let blocked = MockPage::new().with_urls(&[TEST_LOGIN_URL]);
        let mut handle = controller
            .start(pipeline(blocked, &config), TEST_POST_URL.to_string())
            .unwrap();
        assert!(controller.is_active());

        let second = controller.start(pipeline(MockPage::new(), &config), TEST_POST_URL.to_string());
        assert!(matches!(second, Err(PulseError::RunInProgress)));

        handle.cancel();
        while handle.progress.recv().await.is_some() {}
        let err = handle.finish().await.unwrap_err();
        assert!(matches!(err, PulseError::Cancelled));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn cancel_ends_the_run_even_when_progress_is_never_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(&dir);
        config.login.poll_interval_secs = 1;
        let controller = RunController::new(1);

        let blocked = MockPage::new().with_urls(&[TEST_LOGIN_URL]);
        let handle = controller
            .start(pipeline(blocked, &config), TEST_POST_URL.to_string())
            .unwrap();

        handle.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while controller.is_active() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let err = handle.finish().await.unwrap_err();
        assert!(matches!(err, PulseError::Cancelled));
    }

    #[tokio::test]
    async fn lock_is_released_after_a_run_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let controller = RunController::new(8);

        for _ in 0..2 {
            let page = MockPage::new()
                .with_urls(&[TEST_HOME_URL])
                .authenticated_after_polls(1);
            let handle = controller
                .start(pipeline(page, &config), TEST_POST_URL.to_string())
                .unwrap();
            let outcome = handle.finish().await.unwrap();
            assert!(matches!(outcome, RunOutcome::NothingFound { .. }));
            assert!(!controller.is_active());
        }
    }
}
