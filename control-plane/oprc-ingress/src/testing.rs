//! In-memory cluster used by unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;

use crate::cluster::{IngressClient, ObjectLister};
use crate::controller::reconcile::Reconciler;
use crate::error::{ControllerError, Result};
use crate::templates::IngressTemplate;

pub const MARKER: &str = "ingress/http";

type Objects<K> = Mutex<HashMap<(String, String), Arc<K>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(String, Ingress),
    Delete(String, String),
}

/// Listers read what the client writes, like a cache that is always current.
#[derive(Debug, Default)]
pub struct FakeCluster {
    services: Objects<Service>,
    ingresses: Objects<Ingress>,
    calls: Mutex<Vec<Call>>,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub panic_next_write: AtomicBool,
}

fn slot(meta: &ObjectMeta) -> (String, String) {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

impl FakeCluster {
    pub fn put_service(&self, svc: Service) {
        let k = slot(&svc.metadata);
        self.services.lock().unwrap().insert(k, Arc::new(svc));
    }

    pub fn put_ingress(&self, ing: Ingress) {
        let k = slot(&ing.metadata);
        self.ingresses.lock().unwrap().insert(k, Arc::new(ing));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reconciler(self: &Arc<Self>) -> Reconciler {
        Reconciler::new(
            Arc::new(ServiceLister(self.clone())),
            Arc::new(IngressLister(self.clone())),
            self.clone(),
            IngressTemplate::default(),
            MARKER,
        )
    }

    fn check_write(&self) -> Result<()> {
        if self.panic_next_write.swap(false, Ordering::SeqCst) {
            panic!("injected write panic");
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ControllerError::Cache("write refused".into()));
        }
        Ok(())
    }
}

struct ServiceLister(Arc<FakeCluster>);
struct IngressLister(Arc<FakeCluster>);

impl ObjectLister<Service> for ServiceLister {
    fn get(&self, ns: &str, name: &str) -> Result<Option<Arc<Service>>> {
        let k = (ns.to_string(), name.to_string());
        Ok(self.0.services.lock().unwrap().get(&k).cloned())
    }
}

impl ObjectLister<Ingress> for IngressLister {
    fn get(&self, ns: &str, name: &str) -> Result<Option<Arc<Ingress>>> {
        if self.0.fail_reads.load(Ordering::SeqCst) {
            return Err(ControllerError::Cache("cache unavailable".into()));
        }
        let k = (ns.to_string(), name.to_string());
        Ok(self.0.ingresses.lock().unwrap().get(&k).cloned())
    }
}

#[async_trait]
impl IngressClient for FakeCluster {
    async fn create(&self, ns: &str, ing: &Ingress) -> Result<()> {
        self.check_write()?;
        self.calls
            .lock()
            .unwrap()
            .push(Call::Create(ns.to_string(), ing.clone()));
        self.put_ingress(ing.clone());
        Ok(())
    }

    async fn delete(&self, ns: &str, name: &str) -> Result<()> {
        self.check_write()?;
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(ns.to_string(), name.to_string()));
        self.ingresses
            .lock()
            .unwrap()
            .remove(&(ns.to_string(), name.to_string()));
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

pub fn owned_ingress(name: &str) -> Ingress {
    ingress_controlled_by(name, "Service")
}

pub fn ingress_controlled_by(name: &str, kind: &str) -> Ingress {
    let mut ing = unowned_ingress(name);
    ing.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "v1".into(),
        kind: kind.into(),
        name: name.into(),
        uid: format!("uid-{name}"),
        controller: Some(true),
        ..Default::default()
    }]);
    ing
}

pub fn unowned_ingress(name: &str) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("default".into()),
            ..Default::default()
        },
        ..Default::default()
    }
}
