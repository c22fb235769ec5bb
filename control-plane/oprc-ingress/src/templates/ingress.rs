use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend,
    IngressRule, IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use crate::config::IngressTemplateConfig;
use crate::error::{ControllerError, Result};

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Shape of the Ingress rendered for every annotated Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressTemplate {
    pub host: String,
    pub path: String,
    pub path_type: String,
    pub port: i32,
    pub ingress_class: String,
    pub managed_by: String,
}

impl Default for IngressTemplate {
    fn default() -> Self {
        Self {
            host: "example.com".into(),
            path: "/".into(),
            path_type: "Prefix".into(),
            port: 80,
            ingress_class: "nginx".into(),
            managed_by: "oprc-ingress".into(),
        }
    }
}

impl From<&IngressTemplateConfig> for IngressTemplate {
    fn from(cfg: &IngressTemplateConfig) -> Self {
        Self {
            host: cfg.host.clone(),
            path: cfg.path.clone(),
            path_type: cfg.path_type.clone(),
            port: cfg.backend_port,
            ingress_class: cfg.ingress_class.clone(),
            ..Default::default()
        }
    }
}

impl IngressTemplate {
    /// Build the Ingress that `svc` should have.
    ///
    /// The Ingress mirrors the Service's name and namespace and is controlled
    /// by it, so deleting the Service lets the garbage collector cascade.
    pub fn render(&self, svc: &Service) -> Result<Ingress> {
        let name = svc.meta().name.clone().ok_or_else(|| {
            ControllerError::InvalidObject("service has no name".into())
        })?;
        let owner = controller_ref(svc).ok_or_else(|| {
            ControllerError::InvalidObject(format!("service {name} has no uid"))
        })?;

        Ok(Ingress {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: svc.meta().namespace.clone(),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    self.managed_by.clone(),
                )])),
                owner_references: Some(vec![owner]),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                ingress_class_name: Some(self.ingress_class.clone()),
                rules: Some(vec![IngressRule {
                    host: Some(self.host.clone()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some(self.path.clone()),
                            path_type: self.path_type.clone(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name,
                                    port: Some(ServiceBackendPort {
                                        number: Some(self.port),
                                        ..Default::default()
                                    }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

fn controller_ref(svc: &Service) -> Option<OwnerReference> {
    Some(OwnerReference {
        block_owner_deletion: Some(true),
        ..svc.controller_owner_ref(&())?
    })
}
