//! Cancellation-aware suspension points.
//!
//! Every settle delay and every driver/model call in a run goes through one
//! of these so a tripped token ends the run at the next await.

use std::future::Future;
use std::time::Duration;

use pulse_common::PulseError;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless cancelled first.
pub async fn sleep(duration: Duration, cancel: &CancellationToken) -> Result<(), PulseError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PulseError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Drive `fut` to completion unless cancelled first.
pub async fn or_cancel<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, PulseError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PulseError::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_token_wins_over_zero_sleep() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            sleep(Duration::ZERO, &cancel).await,
            Err(PulseError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_when_not_cancelled() {
        let cancel = CancellationToken::new();
        assert!(sleep(Duration::from_secs(30), &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn or_cancel_returns_future_output() {
        let cancel = CancellationToken::new();
        let out = or_cancel(&cancel, async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }
}
