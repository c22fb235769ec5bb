use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use tracing::{debug, info, instrument};

use crate::cluster::{IngressClient, ObjectLister, is_controlled_by};
use crate::error::Result;
use crate::key::ObjectKey;
use crate::templates::IngressTemplate;

/// What a sync changed in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Created,
    Deleted,
    Unchanged,
}

/// Converges the Ingress of one key toward what its Service asks for.
///
/// Every call compares the full desired and observed state, never the event
/// that triggered it, so repeated or coalesced calls are harmless.
pub struct Reconciler {
    services: Arc<dyn ObjectLister<Service>>,
    ingresses: Arc<dyn ObjectLister<Ingress>>,
    client: Arc<dyn IngressClient>,
    template: IngressTemplate,
    marker: String,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("client", &self.client)
            .field("template", &self.template)
            .field("marker", &self.marker)
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        services: Arc<dyn ObjectLister<Service>>,
        ingresses: Arc<dyn ObjectLister<Ingress>>,
        client: Arc<dyn IngressClient>,
        template: IngressTemplate,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            services,
            ingresses,
            client,
            template,
            marker: marker.into(),
        }
    }

    fn wants_ingress(&self, svc: &Service) -> bool {
        svc.metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(&self.marker))
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn sync(&self, key: &str) -> Result<SyncAction> {
        let ObjectKey { namespace, name } = ObjectKey::parse(key)?;

        let svc = self.services.get(&namespace, &name)?;
        let desired = svc.as_deref().filter(|s| self.wants_ingress(s));
        let current = self.ingresses.get(&namespace, &name)?;

        match (desired, current) {
            (Some(svc), None) => {
                let ingress = self.template.render(svc)?;
                self.client.create(&namespace, &ingress).await?;
                info!(%namespace, %name, "created ingress");
                Ok(SyncAction::Created)
            }
            (None, Some(ing)) if is_controlled_by::<Service>(&*ing) => {
                self.client.delete(&namespace, &name).await?;
                info!(%namespace, %name, service_exists = svc.is_some(), "deleted ingress");
                Ok(SyncAction::Deleted)
            }
            (None, Some(_)) => {
                debug!(%namespace, %name, "ingress not controlled by a service; leaving it");
                Ok(SyncAction::Unchanged)
            }
            (Some(_), Some(_)) | (None, None) => {
                debug!(%namespace, %name, "in sync");
                Ok(SyncAction::Unchanged)
            }
        }
    }
}
