//! Deduplicating, rate-limited work queue.
//!
//! A key lives in at most one of two places: the pending FIFO (also tracked in
//! the dirty set) or the processing set. Adding a key that is already pending
//! is a no-op. Adding a key that is being processed only marks it dirty; it
//! goes back on the FIFO when the worker calls [`WorkQueue::done`]. This keeps
//! a single key from being reconciled by two workers at once.

mod rate_limiter;

pub use rate_limiter::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter,
    RateLimiter, default_controller_rate_limiter,
};

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

#[derive(Debug)]
pub struct WorkQueue {
    name: String,
    state: Mutex<State>,
    notify: Notify,
    limiter: Box<dyn RateLimiter>,
}

impl WorkQueue {
    pub fn new(
        name: impl Into<String>,
        limiter: impl RateLimiter + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            limiter: Box::new(limiter),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue `key` unless it is already pending.
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.lock();
        if state.shutting_down {
            trace!(queue = %self.name, %key, "add ignored: shutting down");
            return;
        }
        if !state.dirty.insert(key.clone()) {
            trace!(queue = %self.name, %key, "add coalesced: already pending");
            return;
        }
        if state.processing.contains(&key) {
            trace!(queue = %self.name, %key, "add deferred: in flight");
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next key and mark it in flight.
    ///
    /// Returns `None` once the queue is shut down and every pending key has
    /// been handed out.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as no longer in flight, re-queueing it if it was added
    /// again meanwhile.
    pub fn done(&self, key: &str) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Add `key` after `delay` has elapsed.
    pub fn add_after(self: &Arc<Self>, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(queue) = queue.upgrade() {
                queue.add(key);
            }
        });
    }

    /// Add `key` after the delay chosen by the rate limiter.
    pub fn add_rate_limited(self: &Arc<Self>, key: impl Into<String>) {
        let key = key.into();
        let delay = self.limiter.when(&key);
        trace!(queue = %self.name, %key, delay_ms = delay.as_millis() as u64, "rate limited requeue");
        self.add_after(key, delay);
    }

    pub fn forget(&self, key: &str) {
        self.limiter.forget(key);
    }

    pub fn num_requeues(&self, key: &str) -> u32 {
        self.limiter.num_requeues(key)
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and wake every waiting worker.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}
