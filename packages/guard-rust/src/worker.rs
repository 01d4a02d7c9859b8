//! Background worker for buffered, off-path processing.
//!
//! `BackgroundWorker<R>` feeds tasks from a bounded mpsc channel into a
//! `BackgroundRunnable`, calls its tick hook periodically, and on shutdown
//! drains whatever is still queued before calling the runnable's shutdown hook.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler driven by a `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called on every tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once after the queue is drained on stop. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

struct WorkerHandles<T> {
    tx: mpsc::Sender<T>,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Handle to a spawned worker task.
///
/// All methods take `&self`, so the handle can sit behind an `Arc` shared with
/// submitters.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    handles: Mutex<Option<WorkerHandles<R::Task>>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn start(mut runnable: R, capacity: usize, tick_interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            // First tick completes immediately.
            ticker.tick().await;

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

            rx.close();
            while let Some(task) = rx.recv().await {
                runnable.run(task).await;
            }
            runnable.shutdown().await;
        });

        Self {
            handles: Mutex::new(Some(WorkerHandles {
                tx,
                shutdown_tx,
                handle,
            })),
        }
    }

    /// Queue a task, waiting for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        let tx = self
            .handles
            .lock()
            .as_ref()
            .map(|handles| handles.tx.clone())
            .ok_or_else(|| anyhow::anyhow!("worker not running"))?;
        tx.send(task)
            .await
            .map_err(|_| anyhow::anyhow!("worker channel closed"))
    }

    /// Stop the worker, waiting until queued tasks are processed.
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        let Some(handles) = self.handles.lock().take() else {
            return;
        };
        let _ = handles.shutdown_tx.send(());
        drop(handles.tx);
        if let Err(e) = handles.handle.await {
            tracing::error!(error = %e, "background worker task failed");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handles.lock().is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct CountingRunnable {
        run_count: Arc<AtomicU32>,
        tick_count: Arc<AtomicU32>,
        shutdown_called: Arc<AtomicU32>,
    }

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        async fn run(&mut self, _task: String) {
            self.run_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.tick_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.shutdown_called.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting() -> (CountingRunnable, Arc<AtomicU32>, Arc<AtomicU32>, Arc<AtomicU32>) {
        let run_count = Arc::new(AtomicU32::new(0));
        let tick_count = Arc::new(AtomicU32::new(0));
        let shutdown_called = Arc::new(AtomicU32::new(0));
        let runnable = CountingRunnable {
            run_count: run_count.clone(),
            tick_count: tick_count.clone(),
            shutdown_called: shutdown_called.clone(),
        };
        (runnable, run_count, tick_count, shutdown_called)
    }

    #[tokio::test]
    async fn queued_tasks_drain_on_stop() {
        let (runnable, run_count, _, shutdown_called) = counting();
        let worker = BackgroundWorker::start(runnable, 16, Duration::from_secs(60));

        worker.submit("record-1".to_string()).await.unwrap();
        worker.submit("record-2".to_string()).await.unwrap();
        worker.submit("record-3".to_string()).await.unwrap();
        worker.stop().await;

        assert_eq!(run_count.load(Ordering::SeqCst), 3);
        assert_eq!(shutdown_called.load(Ordering::SeqCst), 1);
        assert!(!worker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_periodically() {
        let (runnable, _, tick_count, _) = counting();
        let worker = BackgroundWorker::start(runnable, 16, Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.stop().await;

        assert!(tick_count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn submit_after_stop_returns_error() {
        let (runnable, _, _, shutdown_called) = counting();
        let worker = BackgroundWorker::start(runnable, 16, Duration::from_secs(60));
        worker.stop().await;
        worker.stop().await;

        assert!(worker.submit("late".to_string()).await.is_err());
        assert_eq!(shutdown_called.load(Ordering::SeqCst), 1);
    }
}
