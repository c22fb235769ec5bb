use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::Resource;
use tracing::{debug, trace, warn};

use crate::cluster::is_controlled_by;
use crate::key::ObjectKey;
use crate::queue::WorkQueue;

/// Watch notifications the controller reacts to, already typed at the cache
/// boundary.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    SourceAdded(Arc<Service>),
    SourceUpdated {
        old: Arc<Service>,
        new: Arc<Service>,
    },
    SourceDeleted(Arc<Service>),
    DerivedDeleted(Arc<Ingress>),
}

/// Turns watch events into work-queue keys.
#[derive(Debug)]
pub struct EventRouter {
    queue: Arc<WorkQueue>,
    enqueue_on_source_delete: bool,
}

impl EventRouter {
    pub fn new(queue: Arc<WorkQueue>, enqueue_on_source_delete: bool) -> Self {
        Self {
            queue,
            enqueue_on_source_delete,
        }
    }

    /// Enqueue the key for `event`, returning it when one was enqueued.
    pub fn route(&self, event: &WatchEvent) -> Option<ObjectKey> {
        match event {
            WatchEvent::SourceAdded(svc) => self.enqueue(&**svc),
            // TODO: skip when the marker annotation did not change between old and new
            WatchEvent::SourceUpdated { new, .. } => self.enqueue(&**new),
            WatchEvent::SourceDeleted(svc) => {
                if self.enqueue_on_source_delete {
                    self.enqueue(&**svc)
                } else {
                    None
                }
            }
            WatchEvent::DerivedDeleted(ing) => {
                if !is_controlled_by::<Service>(&**ing) {
                    trace!(
                        name = ing.meta().name.as_deref().unwrap_or_default(),
                        "ignoring deletion of ingress not controlled by a service"
                    );
                    return None;
                }
                self.enqueue(&**ing)
            }
        }
    }

    /// Enqueue every cached Service and every Service-controlled Ingress.
    ///
    /// Catches Ingresses orphaned while no event for them was observed.
    pub fn resync(&self, services: &[Arc<Service>], ingresses: &[Arc<Ingress>]) -> usize {
        let mut count = 0;
        for svc in services {
            count += usize::from(self.enqueue(&**svc).is_some());
        }
        for ing in ingresses {
            if is_controlled_by::<Service>(&**ing) {
                count += usize::from(self.enqueue(&**ing).is_some());
            }
        }
        debug!(count, "resync enqueued keys");
        count
    }

    fn enqueue<K: Resource>(&self, obj: &K) -> Option<ObjectKey> {
        match ObjectKey::for_object(obj) {
            Ok(key) => {
                self.queue.add(key.to_string());
                Some(key)
            }
            Err(e) => {
                warn!(error = %e, "cannot compute key for event");
                None
            }
        }
    }
}
