use std::fmt;

use kube::Resource;

use crate::error::{ControllerError, Result};

/// Work-queue key identifying one namespaced object.
///
/// Both the Service and its Ingress map to the same key, so events for either
/// side of the pair coalesce into a single work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn for_object<K: Resource>(obj: &K) -> Result<Self> {
        let meta = obj.meta();
        let name = meta
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ControllerError::InvalidObject("object has no name".into())
            })?;
        Ok(Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name,
        })
    }

    pub fn parse(key: &str) -> Result<Self> {
        let mut parts = key.split('/');
        let (namespace, name) =
            match (parts.next(), parts.next(), parts.next()) {
                (Some(name), None, None) => ("", name),
                (Some(ns), Some(name), None) => (ns, name),
                _ => return Err(ControllerError::InvalidKey(key.to_string())),
            };
        if name.is_empty() {
            return Err(ControllerError::InvalidKey(key.to_string()));
        }
        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}
