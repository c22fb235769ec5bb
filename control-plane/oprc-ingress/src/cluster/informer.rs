//! Watch-backed object caches.
//!
//! `kube::runtime::watcher` supplies the list/watch stream and a reflector
//! `Writer` holds the cache. This module only adds what the controller needs
//! on top: classifying each change as added, updated or deleted, and mapping
//! those into [`WatchEvent`]s for the router.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams};
use kube::runtime::reflector::{self, ObjectRef, Store, store::Writer};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::controller::router::{EventRouter, WatchEvent};
use crate::error::Result;

/// A change observed in the cache.
#[derive(Debug, Clone)]
pub enum Notification<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(Arc<K>),
}

impl<K> Notification<K> {
    pub fn object(&self) -> &Arc<K> {
        match self {
            Notification::Added(obj) | Notification::Deleted(obj) => obj,
            Notification::Updated { new, .. } => new,
        }
    }
}

struct Relist<K: Resource> {
    before: Vec<Arc<K>>,
    seen: HashSet<ObjectRef<K>>,
    pending: Vec<Notification<K>>,
}

/// Feeds watcher events into a reflector store and reports what changed.
///
/// During a (re-)list the store keeps serving the previous snapshot, so the
/// notifications for listed objects are held back until the list completes.
/// Objects that were cached before the list but are absent from it are
/// reported as deleted.
pub struct NotificationTracker<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    writer: Writer<K>,
    reader: Store<K>,
    relist: Option<Relist<K>>,
}

impl<K> NotificationTracker<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn new(writer: Writer<K>) -> Self {
        let reader = writer.as_reader();
        Self {
            writer,
            reader,
            relist: None,
        }
    }

    pub fn apply(&mut self, event: watcher::Event<K>) -> Vec<Notification<K>> {
        let prev = match &event {
            watcher::Event::Apply(obj)
            | watcher::Event::InitApply(obj)
            | watcher::Event::Delete(obj) => {
                self.reader.get(&ObjectRef::from_obj(obj))
            }
            watcher::Event::Init | watcher::Event::InitDone => None,
        };
        self.writer.apply_watcher_event(&event);

        match event {
            watcher::Event::Apply(obj) => vec![changed(prev, obj)],
            watcher::Event::Delete(obj) => {
                vec![Notification::Deleted(Arc::new(obj))]
            }
            watcher::Event::Init => {
                self.relist = Some(Relist {
                    before: self.reader.state(),
                    seen: HashSet::new(),
                    pending: Vec::new(),
                });
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let notification = changed(prev, obj);
                match self.relist.as_mut() {
                    Some(relist) => {
                        let obj: &K = notification.object();
                        relist.seen.insert(ObjectRef::from_obj(obj));
                        relist.pending.push(notification);
                        Vec::new()
                    }
                    None => vec![notification],
                }
            }
            watcher::Event::InitDone => {
                let Some(relist) = self.relist.take() else {
                    return Vec::new();
                };
                let mut out = relist.pending;
                out.extend(
                    relist
                        .before
                        .into_iter()
                        .filter(|obj| {
                            let obj: &K = obj;
                            !relist.seen.contains(&ObjectRef::from_obj(obj))
                        })
                        .map(Notification::Deleted),
                );
                out
            }
        }
    }
}

fn changed<K>(prev: Option<Arc<K>>, obj: K) -> Notification<K> {
    let new = Arc::new(obj);
    match prev {
        Some(old) => Notification::Updated { old, new },
        None => Notification::Added(new),
    }
}

/// Service notifications all matter to the router.
pub fn source_event(n: Notification<Service>) -> WatchEvent {
    match n {
        Notification::Added(svc) => WatchEvent::SourceAdded(svc),
        Notification::Updated { old, new } => {
            WatchEvent::SourceUpdated { old, new }
        }
        Notification::Deleted(svc) => WatchEvent::SourceDeleted(svc),
    }
}

/// Only Ingress deletions are routed; the controller creates the others.
pub fn derived_event(n: Notification<Ingress>) -> Option<WatchEvent> {
    match n {
        Notification::Deleted(ing) => Some(WatchEvent::DerivedDeleted(ing)),
        Notification::Added(_) | Notification::Updated { .. } => None,
    }
}

/// Run a watcher for `api` until the stream ends, passing every notification
/// to `on_change`.
pub async fn run_informer<K, F>(api: Api<K>, writer: Writer<K>, mut on_change: F)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
    F: FnMut(Notification<K>) + Send,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let mut tracker = NotificationTracker::new(writer);
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                for notification in tracker.apply(event) {
                    on_change(notification);
                }
            }
            Err(e) => warn!(%kind, error = %e, "watch failed; backing off"),
        }
    }
    warn!(%kind, "watch stream ended");
}

/// Services and Ingresses of one namespace, kept current by watches.
#[derive(Clone)]
pub struct WatchCache {
    pub services: Store<Service>,
    pub ingresses: Store<Ingress>,
}

impl WatchCache {
    /// Start both watches and route their events.
    ///
    /// Fails if either kind cannot be listed, which is the only point at which
    /// the controller gives up.
    pub async fn start(
        client: Client,
        namespace: &str,
        router: Arc<EventRouter>,
    ) -> Result<(Self, Vec<JoinHandle<()>>)> {
        let svc_api: Api<Service> = Api::namespaced(client.clone(), namespace);
        let ing_api: Api<Ingress> = Api::namespaced(client, namespace);

        svc_api.list(&ListParams::default().limit(1)).await?;
        ing_api.list(&ListParams::default().limit(1)).await?;
        info!(%namespace, "watching services and ingresses");

        let (services, svc_writer) = reflector::store();
        let (ingresses, ing_writer) = reflector::store();

        let svc_router = router.clone();
        let svc_task = tokio::spawn(run_informer(svc_api, svc_writer, move |n| {
            svc_router.route(&source_event(n));
        }));
        let ing_task = tokio::spawn(run_informer(ing_api, ing_writer, move |n| {
            if let Some(event) = derived_event(n) {
                router.route(&event);
            }
        }));

        Ok((
            Self {
                services,
                ingresses,
            },
            vec![svc_task, ing_task],
        ))
    }

    /// Wait until both caches hold a complete initial list.
    pub async fn wait_until_ready(&self) -> anyhow::Result<()> {
        self.services.wait_until_ready().await?;
        self.ingresses.wait_until_ready().await?;
        debug!(
            services = self.services.state().len(),
            ingresses = self.ingresses.state().len(),
            "caches synced"
        );
        Ok(())
    }
}
