use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::Client;
use kube::api::{Api, DeleteParams, PostParams};
use tracing::{debug, instrument};

use super::IngressClient;
use crate::error::{ControllerError, Result};

/// [`IngressClient`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeIngressClient {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeIngressClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeIngressClient")
            .field("field_manager", &self.field_manager)
            .finish()
    }
}

impl KubeIngressClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl IngressClient for KubeIngressClient {
    #[instrument(level = "debug", skip(self, ingress), fields(name = ingress.metadata.name.as_deref().unwrap_or_default()))]
    async fn create(&self, namespace: &str, ingress: &Ingress) -> Result<()> {
        let pp = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.api(namespace).create(&pp, ingress).await?;
        debug!("ingress created");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!("ingress deleted");
                Ok(())
            }
            Err(e) => {
                let err = ControllerError::from(e);
                if err.is_not_found() {
                    debug!("ingress already gone");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}
