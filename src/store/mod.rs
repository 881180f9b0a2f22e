//! # Resource Store
//!
//! Seams between the controllers and the cluster. The controllers only talk to
//! a [`ResourceStore`] and an [`EventPublisher`]; `cluster.rs` implements both on
//! top of the Kubernetes API and a reflector-backed CertWatcher index.

mod cluster;

pub use cluster::{KubeEventPublisher, KubeStore};

use crate::crd::CertWatcher;
use crate::error::{CertWatchError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use std::fmt;
use std::str::FromStr;

/// Namespace and name of an object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
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
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Parses the "namespace/name" form used by `credentialSecret`
impl FromStr for ObjectKey {
    type Err = CertWatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(*namespace, *name))
            }
            _ => Err(CertWatchError::Config(format!(
                "invalid object reference {s:?}: expected namespace/name"
            ))),
        }
    }
}

/// Access to Secrets and CertWatchers
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a Secret; `NotFound` when it does not exist
    async fn get_secret(&self, key: &ObjectKey) -> Result<Secret>;

    /// Fetch the current version of a CertWatcher; `NotFound` when it does not exist
    async fn get_watcher(&self, key: &ObjectKey) -> Result<CertWatcher>;

    /// CertWatchers whose `spec.secret` references the given Secret.
    ///
    /// The index may be stale; callers re-read each dependent before acting on it.
    fn dependents(&self, secret: &ObjectKey) -> Vec<ObjectKey>;

    /// Write the status of `watcher`, conditional on its `resourceVersion`.
    ///
    /// Returns the updated object, or `Conflict` when the stored object has
    /// changed since `watcher` was read.
    async fn update_status(&self, watcher: &CertWatcher) -> Result<CertWatcher>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Publishes Kubernetes Events about a CertWatcher
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, watcher: &CertWatcher, kind: EventKind, reason: &str, note: String);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_key() {
        let key: ObjectKey = "ops/ssh-creds".parse().unwrap();
        assert_eq!(key, ObjectKey::new("ops", "ssh-creds"));
        assert_eq!(key.to_string(), "ops/ssh-creds");
    }

    #[test]
    fn test_parse_object_key_rejects_malformed_references() {
        for raw in ["ssh-creds", "ops/", "/ssh-creds", "a/b/c", ""] {
            assert!(
                matches!(raw.parse::<ObjectKey>(), Err(CertWatchError::Config(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
