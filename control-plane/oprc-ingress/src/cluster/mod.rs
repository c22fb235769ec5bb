//! Boundary with the cluster: cached reads, remote writes and watch events.

pub mod api;
pub mod informer;

pub use api::KubeIngressClient;
pub use informer::{Notification, WatchCache};

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::Resource;
use kube::runtime::reflector::{ObjectRef, Store};

use crate::error::Result;

/// Read access to a cache of objects of kind `K`.
pub trait ObjectLister<K>: Send + Sync {
    /// `Ok(None)` means the object does not exist; errors are lookup failures.
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>>;
}

impl<K> ObjectLister<K> for Store<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Arc<K>>> {
        let obj_ref = ObjectRef::<K>::new(name).within(namespace);
        Ok(Store::get(self, &obj_ref))
    }
}

/// Writes against the authoritative store for Ingresses.
#[async_trait]
pub trait IngressClient: Send + Sync + Debug {
    async fn create(&self, namespace: &str, ingress: &Ingress) -> Result<()>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// True when `obj` has a controller owner reference of kind `Owner`.
pub fn is_controlled_by<Owner>(obj: &impl Resource) -> bool
where
    Owner: Resource<DynamicType = ()>,
{
    let kind = Owner::kind(&());
    obj.meta()
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.controller == Some(true) && r.kind == kind)
}
