//! C8 Task Runner: bounds how many acquisition tasks (downloads, archive
//! extractions, verifications) run concurrently and gives every caller a
//! single cancellation handle scoped to just their task.
//!
//! Built from a `Semaphore` (the concurrency bound), a `CancellationToken`
//! (whose children are handed out per-task so cancelling one task never
//! cancels its siblings), and a `JoinSet` (so completed tasks are reaped
//! without the caller having to poll a `Vec<JoinHandle<_>>` by hand).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::AcquireResult;

/// A handle to a task submitted to the runner. Dropping it does not cancel
/// the task; call `cancel()` explicitly.
#[derive(Clone)]
pub struct TaskHandle {
    cancel: CancellationToken,
}

impl TaskHandle {
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs acquisition tasks with a bounded concurrency and a root
/// cancellation token that, when cancelled, cancels every task still
/// running (shutdown), while each task also gets its own child token for
/// fine-grained per-task cancellation (cancel this one download).
pub struct TaskRunner {
    semaphore: Arc<Semaphore>,
    root_cancel: CancellationToken,
    joins: JoinSet<()>,
}

impl TaskRunner {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            root_cancel: CancellationToken::new(),
            joins: JoinSet::new(),
        }
    }

    /// Submit a task. `make_future` receives the per-task cancellation
    /// token and the acquired semaphore permit is held for the task's
    /// entire lifetime, released automatically when the future completes
    /// or is dropped.
    ///
    /// Submission itself never blocks on the semaphore; the permit is
    /// acquired inside the spawned task, so `submit` can be called from a
    /// hot loop without stalling the caller even when the runner is at
    /// capacity.
    pub fn submit<F, Fut>(&mut self, make_future: F) -> TaskHandle
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let task_cancel = self.root_cancel.child_token();
        let handle = TaskHandle {
            cancel: task_cancel.clone(),
        };
        let semaphore = Arc::clone(&self.semaphore);

        self.joins.spawn(async move {
            let _permit = tokio::select! {
                biased;
                () = task_cancel.cancelled() => return,
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            make_future(task_cancel).await;
        });

        handle
    }

    /// Submit a task that repeats `work` every `interval` until the runner
    /// (or the returned handle) is cancelled, swallowing anything `work`
    /// panics with on a single tick rather than taking the whole loop down
    /// — one bad iteration (a VAD frame that trips an engine bug) must not
    /// stop every later one. Used for the streaming pipeline's periodic
    /// drain (C10) and any other fixed-interval background loop.
    pub fn spawn_periodic<F, Fut>(&mut self, interval: Duration, mut work: F) -> TaskHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.submit(move |cancel| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                work().await;
            }
        })
    }

    /// Cancel every task currently running under this runner.
    pub fn cancel_all(&self) {
        self.root_cancel.cancel();
    }

    /// Wait for every submitted task to finish (successfully, cancelled, or
    /// panicked — panics are swallowed here since a single model's
    /// acquisition failing must never take down the runner).
    pub async fn join_all(&mut self) {
        while let Some(result) = self.joins.join_next().await {
            if let Err(join_err) = result {
                if join_err.is_panic() {
                    tracing::error!(error = %join_err, "acquisition task panicked");
                }
            }
        }
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.joins.len()
    }
}

/// Run `fut` to completion unless `cancel` fires first, converting a
/// cancellation race into a single `AcquireResult`. Shared by every
/// component that layers its own retry/backoff loop over a cancellable
/// unit of work (the downloader, the extractor, the health checker).
pub async fn run_cancellable<T, Fut>(
    cancel: &CancellationToken,
    fut: Fut,
) -> AcquireResult<T>
where
    Fut: std::future::Future<Output = AcquireResult<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(crate::error::AcquireError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_submitted_tasks_to_completion() {
        let mut runner = TaskRunner::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            runner.submit(move |_cancel| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        runner.join_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn respects_concurrency_bound() {
        let mut runner = TaskRunner::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let concurrent = Arc::clone(&concurrent);
            let max_seen = Arc::clone(&max_seen);
            runner.submit(move |_cancel| async move {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            });
        }

        runner.join_all().await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancelling_a_task_handle_skips_its_work() {
        let mut runner = TaskRunner::new(1);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);

        let handle = runner.submit(move |_cancel| async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();

        runner.join_all().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn spawn_periodic_ticks_until_cancelled() {
        let mut runner = TaskRunner::new(1);
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let handle = runner.spawn_periodic(Duration::from_millis(5), move || {
            let ticks = Arc::clone(&ticks_clone);
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.cancel();
        runner.join_all().await;

        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn cancel_all_stops_pending_tasks() {
        let mut runner = TaskRunner::new(1);
        let ran = Arc::new(AtomicUsize::new(0));

        // First task holds the only permit for a while.
        runner.submit(|_cancel| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        let ran_clone = Arc::clone(&ran);
        runner.submit(move |_cancel| async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });

        runner.cancel_all();
        runner.join_all().await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
