use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::refresher::Refresher;

/// Default time between batches
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Shorter intervals, including zero, are raised to this
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Recurring, unattended refresh of every feed.
///
/// One batch runs as soon as the scheduler starts, then one per `interval`.
/// A batch that overruns the interval delays the next tick instead of
/// triggering a burst of catch-up batches.
///
/// # Example
///
/// ```rust,ignore
/// let handle = Scheduler::new(refresher, DEFAULT_INTERVAL).start();
/// // ...
/// handle.shutdown().await;
/// ```
pub struct Scheduler {
    refresher: Arc<Refresher>,
    interval: Duration,
}

/// Control side of a running scheduler task.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    run_now_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(refresher: Arc<Refresher>, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis() as u64,
                "Refresh interval too short, using {:?}",
                MIN_INTERVAL
            );
        }
        Self {
            refresher,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Spawn the scheduler task. Must be called inside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Capacity 1: repeated requests while a batch is pending coalesce
        let (run_now_tx, run_now_rx) = mpsc::channel(1);

        let task = tokio::spawn(self.run(shutdown_rx, run_now_rx));

        SchedulerHandle {
            shutdown_tx,
            run_now_tx,
            task,
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut run_now_rx: mpsc::Receiver<()>) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            let trigger = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = timer.tick() => "interval",
                Some(()) = run_now_rx.recv() => "manual",
            };

            if *shutdown_rx.borrow() {
                break;
            }

            let summary = self.refresher.refresh_all_until(&shutdown_rx).await;
            tracing::info!(
                trigger = trigger,
                total = summary.total,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Refresh batch finished"
            );
        }

        tracing::info!("Scheduler stopped");
    }
}

impl SchedulerHandle {
    /// Request a batch outside the regular schedule.
    ///
    /// Ignored if a request is already queued.
    pub fn run_now(&self) {
        if self.run_now_tx.try_send(()).is_err() {
            tracing::debug!("Refresh already queued");
        }
    }

    /// Signal the task to stop and wait for it to exit.
    ///
    /// A feed being refreshed when the signal arrives completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fake_store::{feed, FakeStore};
    use crate::feed::FetchLimits;

    /// Feeds without selectors fail before any network access, so batches
    /// finish without touching real sockets while time is paused.
    fn store_with_unconfigured_feed() -> Arc<FakeStore> {
        let mut definition = feed(1, "https://example.com/");
        definition.item_selector = None;
        Arc::new(FakeStore::with_feeds(vec![definition]))
    }

    fn scheduler(store: Arc<FakeStore>, interval: Duration) -> Scheduler {
        let refresher = Refresher::new(store, reqwest::Client::new(), FetchLimits::default());
        Scheduler::new(Arc::new(refresher), interval)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_interval() {
        let store = store_with_unconfigured_feed();
        let handle = scheduler(store.clone(), Duration::from_secs(60)).start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.list_calls(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.list_calls(), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_future_batches() {
        let store = store_with_unconfigured_feed();
        let handle = scheduler(store.clone(), Duration::from_secs(60)).start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown().await;
        let after_shutdown = store.list_calls();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(store.list_calls(), after_shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now_triggers_extra_batch() {
        let store = store_with_unconfigured_feed();
        let handle = scheduler(store.clone(), DEFAULT_INTERVAL).start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.list_calls(), 1);

        handle.run_now();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.list_calls(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_keeps_running() {
        let store = store_with_unconfigured_feed();
        let handle = scheduler(store.clone(), Duration::ZERO).start();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!handle.task.is_finished());
        assert!(store.list_calls() >= 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_feed_does_not_stop_scheduling() {
        let store = store_with_unconfigured_feed();
        let handle = scheduler(store.clone(), Duration::from_secs(10)).start();

        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(store.list_calls(), 4);
        assert!(store.items().is_empty());
        handle.shutdown().await;
    }
}
