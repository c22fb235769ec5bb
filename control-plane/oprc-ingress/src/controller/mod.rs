//! Worker pool that drains the work queue through the reconciler.

pub mod reconcile;
pub mod retry;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::queue::WorkQueue;
use reconcile::Reconciler;
use retry::RetryPolicy;

/// Marks the key done however processing ends, including by panic.
struct DoneGuard<'a> {
    queue: &'a WorkQueue,
    key: &'a str,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(
                queue = %self.queue.name(),
                key = %self.key,
                "reconcile panicked; key released without retry"
            );
            self.queue.forget(self.key);
        }
        self.queue.done(self.key);
    }
}

#[derive(Debug)]
pub struct IngressController {
    queue: Arc<WorkQueue>,
    reconciler: Reconciler,
    retry: RetryPolicy,
    workers: usize,
    restart_delay: Duration,
}

impl IngressController {
    pub fn new(
        queue: Arc<WorkQueue>,
        reconciler: Reconciler,
        retry: RetryPolicy,
        workers: usize,
        restart_delay: Duration,
    ) -> Self {
        Self {
            queue,
            reconciler,
            retry,
            workers: workers.max(1),
            restart_delay,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Reconcile one key. Returns `false` once the queue is shut down.
    pub async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let _done = DoneGuard {
            queue: &self.queue,
            key: &key,
        };
        let result = self.reconciler.sync(&key).await;
        self.retry.handle(&self.queue, &key, result);
        true
    }

    async fn worker(self: Arc<Self>, id: usize) {
        debug!(worker = id, "worker started");
        while self.process_next_item().await {}
        debug!(worker = id, "worker stopped");
    }

    /// Keep one worker alive, restarting it after a panic.
    async fn supervise(self: Arc<Self>, id: usize, shutdown: CancellationToken) {
        loop {
            match tokio::spawn(self.clone().worker(id)).await {
                Ok(()) => return,
                Err(e) if e.is_panic() => {
                    error!(
                        worker = id,
                        restart_in_secs = self.restart_delay.as_secs_f64(),
                        "worker panicked"
                    );
                }
                Err(e) => {
                    error!(worker = id, error = %e, "worker task cancelled");
                    return;
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }
    }

    /// Run the workers until `shutdown` fires, then close the queue and wait
    /// for in-flight keys to finish.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(workers = self.workers, queue = %self.queue.name(), "starting workers");
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(self.clone().supervise(id, shutdown.clone()));
        }

        shutdown.cancelled().await;
        info!("shutting down work queue");
        self.queue.shut_down();
        while workers.join_next().await.is_some() {}
        info!("all workers stopped");
    }
}
