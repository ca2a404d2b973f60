//! Cancellation of an in-flight engine run.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::EngineError;

/// Which side of the race settled first.
#[derive(Debug)]
pub enum RaceOutcome<T> {
    /// The engine finished before any cancellation.
    Completed(T),
    /// Cancellation was requested, or the engine reported it was aborted.
    Cancelled,
    /// The engine failed.
    Failed(EngineError),
}

/// Cancellation state for one conversion request.
///
/// Clones share state, so the controller can hand one clone to whoever
/// calls [`request_cancel`](Self::request_cancel) while keeping another for
/// the race. The requested flag only ever goes from unset to set.
#[derive(Debug, Clone, Default)]
pub struct CancellationCoordinator {
    requested: Arc<AtomicBool>,
    token: CancellationToken,
}

impl CancellationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns `true` only for the first call.
    pub fn request_cancel(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            debug!("Cancellation already requested");
            return false;
        }
        info!("Cancellation requested");
        self.token.cancel();
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Races `work` against cancellation.
    ///
    /// If cancellation was requested before the race starts, `work` is never
    /// polled. Once cancellation is observed, `abort` is awaited (its errors
    /// are ignored) and `work` is dropped without waiting for it to settle.
    pub async fn race<T, W, A>(&self, work: W, abort: A) -> RaceOutcome<T>
    where
        W: Future<Output = Result<T, EngineError>>,
        A: Future<Output = Result<(), EngineError>>,
    {
        if self.is_cancel_requested() {
            debug!("Cancelled before execution, skipping engine run");
            return RaceOutcome::Cancelled;
        }

        tokio::select! {
            biased;

            _ = self.token.cancelled() => {
                if let Err(e) = abort.await {
                    debug!(error = %e, "Engine abort failed, ignoring");
                }
                RaceOutcome::Cancelled
            }
            result = work => match result {
                Ok(value) => RaceOutcome::Completed(value),
                Err(EngineError::Aborted) => RaceOutcome::Cancelled,
                Err(e) => RaceOutcome::Failed(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_request_cancel_is_idempotent() {
        let coordinator = CancellationCoordinator::new();
        assert!(!coordinator.is_cancel_requested());
        assert!(coordinator.request_cancel());
        assert!(!coordinator.request_cancel());
        assert!(coordinator.clone().is_cancel_requested());
    }

    #[tokio::test]
    async fn test_completed_when_not_cancelled() {
        let coordinator = CancellationCoordinator::new();
        let outcome = coordinator
            .race(async { Ok::<_, EngineError>(42) }, async { Ok(()) })
            .await;
        assert!(matches!(outcome, RaceOutcome::Completed(42)));
    }

    #[tokio::test]
    async fn test_failed_passes_error() {
        let coordinator = CancellationCoordinator::new();
        let outcome = coordinator
            .race(
                async { Err::<(), _>(EngineError::failed("bad")) },
                async { Ok(()) },
            )
            .await;
        assert!(matches!(outcome, RaceOutcome::Failed(EngineError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_engine_abort_signal_maps_to_cancelled() {
        let coordinator = CancellationCoordinator::new();
        let outcome = coordinator
            .race(async { Err::<(), _>(EngineError::Aborted) }, async { Ok(()) })
            .await;
        assert!(matches!(outcome, RaceOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_pre_cancel_skips_work() {
        let coordinator = CancellationCoordinator::new();
        coordinator.request_cancel();

        let polled = AtomicUsize::new(0);
        let outcome = coordinator
            .race(
                async {
                    polled.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, EngineError>(())
                },
                async { Ok(()) },
            )
            .await;

        assert!(matches!(outcome, RaceOutcome::Cancelled));
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_wins_and_abort_errors_are_suppressed() {
        let coordinator = CancellationCoordinator::new();
        let aborts = AtomicUsize::new(0);

        let canceller = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.request_cancel();
        });

        let outcome = coordinator
            .race(
                async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, EngineError>("finished")
                },
                async {
                    aborts.fetch_add(1, Ordering::SeqCst);
                    Err(EngineError::failed("abort not supported"))
                },
            )
            .await;

        assert!(matches!(outcome, RaceOutcome::Cancelled));
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_wakes_pending_race() {
        let coordinator = CancellationCoordinator::new();
        let mut race = tokio_test::task::spawn(coordinator.race(
            std::future::pending::<Result<(), EngineError>>(),
            async { Ok(()) },
        ));

        tokio_test::assert_pending!(race.poll());
        coordinator.request_cancel();
        assert!(race.is_woken());

        let outcome = tokio_test::assert_ready!(race.poll());
        assert!(matches!(outcome, RaceOutcome::Cancelled));
    }
}
