#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::ObjectMeta;
use kube::core::ErrorResponse;
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher;
use oprc_ingress::cluster::informer::{
    NotificationTracker, derived_event, source_event,
};
use oprc_ingress::cluster::{IngressClient, ObjectLister};
use oprc_ingress::controller::IngressController;
use oprc_ingress::controller::reconcile::Reconciler;
use oprc_ingress::controller::retry::RetryPolicy;
use oprc_ingress::controller::router::EventRouter;
use oprc_ingress::error::{ControllerError, Result};
use oprc_ingress::queue::{ItemExponentialFailureRateLimiter, WorkQueue};
use oprc_ingress::templates::IngressTemplate;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const MARKER: &str = "ingress/http";

/// API server stand-in: writes go through the same tracker and reflector
/// stores the real informers use, and the resulting notifications are routed.
pub struct FakeApiServer {
    services: Mutex<NotificationTracker<Service>>,
    ingresses: Mutex<NotificationTracker<Ingress>>,
    pub service_store: Store<Service>,
    pub ingress_store: Store<Ingress>,
    router: Arc<EventRouter>,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_next_creates: AtomicUsize,
}

impl std::fmt::Debug for FakeApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeApiServer").finish_non_exhaustive()
    }
}

impl FakeApiServer {
    pub fn new(router: Arc<EventRouter>) -> Arc<Self> {
        let (service_store, svc_writer) = reflector::store();
        let (ingress_store, ing_writer) = reflector::store();
        Arc::new(Self {
            services: Mutex::new(NotificationTracker::new(svc_writer)),
            ingresses: Mutex::new(NotificationTracker::new(ing_writer)),
            service_store,
            ingress_store,
            router,
            creates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_next_creates: AtomicUsize::new(0),
        })
    }

    fn emit_service(&self, event: watcher::Event<Service>) {
        let notifications = self.services.lock().unwrap().apply(event);
        for n in notifications {
            self.router.route(&source_event(n));
        }
    }

    fn emit_ingress(&self, event: watcher::Event<Ingress>) {
        let notifications = self.ingresses.lock().unwrap().apply(event);
        for n in notifications.into_iter().filter_map(derived_event) {
            self.router.route(&n);
        }
    }

    pub fn apply_service(&self, svc: Service) {
        self.emit_service(watcher::Event::Apply(svc));
    }

    pub fn delete_service(&self, svc: Service) {
        self.emit_service(watcher::Event::Delete(svc));
    }

    pub fn apply_ingress(&self, ing: Ingress) {
        self.emit_ingress(watcher::Event::Apply(ing));
    }

    pub fn delete_ingress(&self, ing: Ingress) {
        self.emit_ingress(watcher::Event::Delete(ing));
    }

    pub fn ingress(&self, name: &str) -> Option<Arc<Ingress>> {
        ObjectLister::get(&self.ingress_store, "default", name).unwrap()
    }
}

fn api_error(code: u16, reason: &str) -> ControllerError {
    ControllerError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: reason.to_lowercase(),
        reason: reason.into(),
        code,
    }))
}

#[async_trait]
impl IngressClient for FakeApiServer {
    async fn create(&self, namespace: &str, ingress: &Ingress) -> Result<()> {
        let name = ingress.metadata.name.clone().unwrap_or_default();
        if self
            .fail_next_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(api_error(503, "ServiceUnavailable"));
        }
        if ObjectLister::get(&self.ingress_store, namespace, &name)?.is_some() {
            return Err(api_error(409, "AlreadyExists"));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.apply_ingress(ingress.clone());
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let Some(existing) = ObjectLister::get(&self.ingress_store, namespace, name)? else {
            return Err(api_error(404, "NotFound"));
        };
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.delete_ingress(Ingress::clone(&existing));
        Ok(())
    }
}

pub fn service(name: &str, marked: bool) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("default".into()),
            uid: Some(format!("uid-{name}")),
            annotations: marked
                .then(|| BTreeMap::from([(MARKER.to_string(), String::new())])),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub struct Harness {
    pub api: Arc<FakeApiServer>,
    pub queue: Arc<WorkQueue>,
    shutdown: CancellationToken,
    run: JoinHandle<()>,
}

impl Harness {
    pub fn start(enqueue_on_source_delete: bool) -> Self {
        let queue = WorkQueue::new(
            "it",
            ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(1),
                Duration::from_millis(20),
            ),
        );
        let router = Arc::new(EventRouter::new(queue.clone(), enqueue_on_source_delete));
        let api = FakeApiServer::new(router);
        let reconciler = Reconciler::new(
            Arc::new(api.service_store.clone()),
            Arc::new(api.ingress_store.clone()),
            api.clone(),
            IngressTemplate::default(),
            MARKER,
        );
        let controller = Arc::new(IngressController::new(
            queue.clone(),
            reconciler,
            RetryPolicy::default(),
            3,
            Duration::from_millis(10),
        ));
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(controller.run(shutdown.clone()));
        Self {
            api,
            queue,
            shutdown,
            run,
        }
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.run)
            .await
            .expect("controller did not stop")
            .expect("controller task failed");
    }
}

pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let res = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(res.is_ok(), "timed out waiting for: {what}");
}

/// Give the workers a chance to act on anything still queued.
pub async fn settle(queue: &WorkQueue) {
    eventually("queue drained", || queue.is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
}
