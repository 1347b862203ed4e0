//! Background worker for periodic and on-demand maintenance.
//!
//! A [`BackgroundWorker`] owns one spawned task that feeds submitted work to
//! a [`BackgroundRunnable`] and calls its `on_tick` hook on a fixed cadence.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Capacity of the task channel feeding a worker.
const TASK_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler driven by a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "background"
    }

    async fn run(&mut self, task: Self::Task);

    /// Called on each tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once after the loop exits. Default is a no-op.
    async fn shutdown(&mut self) {}
}

/// Why a task could not be handed to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("worker is stopped")]
    Stopped,
    #[error("worker queue is full")]
    Full,
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Handle to a spawned worker loop.
///
/// Ticks that are missed while a task runs are delayed, not bunched up.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker loop for `runnable`, ticking every `tick_interval`.
    ///
    /// # Panics
    ///
    /// Panics if `tick_interval` is zero.
    pub fn start(mut runnable: R, tick_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(TASK_CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let name = runnable.name();
            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so work starts one interval in.
            ticker.tick().await;
            debug!(worker = name, ?tick_interval, "worker started");

            loop {
                tokio::select! {
                    task = rx.recv() => match task {
                        Some(task) => runnable.run(task).await,
                        None => break,
                    },
                    _ = ticker.tick() => runnable.on_tick().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            runnable.shutdown().await;
            debug!(worker = name, "worker stopped");
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Queues a task, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Stopped` once the worker has stopped.
    pub async fn submit(&self, task: R::Task) -> Result<(), WorkerError> {
        let tx = self.tx.as_ref().ok_or(WorkerError::Stopped)?;
        tx.send(task).await.map_err(|_| WorkerError::Stopped)
    }

    /// Queues a task without waiting.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Full` if the queue is full, `WorkerError::Stopped`
    /// once the worker has stopped.
    pub fn try_submit(&self, task: R::Task) -> Result<(), WorkerError> {
        let tx = self.tx.as_ref().ok_or(WorkerError::Stopped)?;
        tx.try_send(task).map_err(|err| match err {
            TrySendError::Full(_) => WorkerError::Full,
            TrySendError::Closed(_) => WorkerError::Stopped,
        })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signals the loop to exit and waits for `shutdown()` to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // The loop may already be gone.
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default, Clone)]
    struct Counters {
        runs: Arc<AtomicU32>,
        ticks: Arc<AtomicU32>,
        shutdowns: Arc<AtomicU32>,
    }

    struct CountingRunnable(Counters);

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = u32;

        async fn run(&mut self, _task: u32) {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_submit_and_stop() {
        let counters = Counters::default();
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters.clone()), Duration::from_secs(60));
        assert!(worker.is_running());

        for task in 0..3 {
            worker.submit(task).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.runs.load(Ordering::SeqCst), 3);

        worker.stop().await;
        assert!(!worker.is_running());
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_periodically() {
        let counters = Counters::default();
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters.clone()), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.stop().await;

        assert!(counters.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn submit_after_stop_returns_error() {
        let mut worker =
            BackgroundWorker::start(CountingRunnable(Counters::default()), Duration::from_secs(60));
        worker.stop().await;

        assert_eq!(worker.submit(7).await, Err(WorkerError::Stopped));
        assert_eq!(worker.try_submit(7), Err(WorkerError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn try_submit_enqueues_without_waiting() {
        let counters = Counters::default();
        let mut worker =
            BackgroundWorker::start(CountingRunnable(counters.clone()), Duration::from_secs(60));

        worker.try_submit(1).unwrap();
        worker.try_submit(2).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.stop().await;

        assert_eq!(counters.runs.load(Ordering::SeqCst), 2);
    }
}
