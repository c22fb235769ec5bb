use std::sync::Arc;

use tracing::{debug, error, warn};

use super::reconcile::SyncAction;
use crate::error::Result;
use crate::queue::WorkQueue;

/// Outcome of handling one sync result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Success, or an absent object; the failure count was reset.
    Forgotten,
    /// Transient failure; the key was re-added after a backoff.
    Requeued,
    /// Permanent failure or retries exhausted; the key was dropped.
    Dropped,
}

/// Decides whether a failed key is retried.
///
/// A key is retried with rate-limited backoff until it has failed
/// `max_retries` times in a row. The next failure drops it and resets its
/// count, so a later event starts a fresh series.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 10 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn handle(
        &self,
        queue: &Arc<WorkQueue>,
        key: &str,
        result: Result<SyncAction>,
    ) -> RetryDecision {
        let err = match result {
            Ok(action) => {
                debug!(%key, ?action, "sync succeeded");
                queue.forget(key);
                return RetryDecision::Forgotten;
            }
            Err(e) if e.is_not_found() => {
                debug!(%key, error = %e, "object gone; nothing to retry");
                queue.forget(key);
                return RetryDecision::Forgotten;
            }
            Err(e) => e,
        };

        if err.is_permanent() {
            error!(%key, error = %err, "sync failed permanently; dropping key");
            queue.forget(key);
            return RetryDecision::Dropped;
        }

        let attempts = queue.num_requeues(key);
        if attempts < self.max_retries {
            warn!(%key, attempts, error = %err, "sync failed; requeueing");
            queue.add_rate_limited(key);
            RetryDecision::Requeued
        } else {
            error!(%key, attempts, error = %err, "sync failed too many times; dropping key");
            queue.forget(key);
            RetryDecision::Dropped
        }
    }
}
