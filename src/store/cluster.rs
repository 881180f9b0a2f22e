//! # Cluster Store
//!
//! [`ResourceStore`] and [`EventPublisher`] backed by the Kubernetes API.
//!
//! CertWatcher lookups by watched Secret are answered from the reflector store
//! shared with the lifecycle controller, so no extra watch is opened.

use super::{EventKind, EventPublisher, ObjectKey, ResourceStore};
use crate::constants::CONTROLLER_NAME;
use crate::crd::CertWatcher;
use crate::error::{CertWatchError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::runtime::reflector::Store;
use kube::{Client, Resource};
use tracing::{debug, warn};

pub struct KubeStore {
    client: Client,
    watchers: Store<CertWatcher>,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("indexed_watchers", &self.watchers.state().len())
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client, watchers: Store<CertWatcher>) -> Self {
        Self { client, watchers }
    }

    /// Blocks until the CertWatcher index has received its initial list
    pub async fn wait_until_ready(&self) -> Result<()> {
        self.watchers.wait_until_ready().await.map_err(|e| {
            CertWatchError::Config(format!("CertWatcher index never became ready: {e}"))
        })
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_secret(&self, key: &ObjectKey) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &key.namespace);
        match api.get(&key.name).await {
            Ok(secret) => Ok(secret),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Err(
                CertWatchError::not_found("Secret", &key.namespace, &key.name),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_watcher(&self, key: &ObjectKey) -> Result<CertWatcher> {
        let api: Api<CertWatcher> = Api::namespaced(self.client.clone(), &key.namespace);
        match api.get(&key.name).await {
            Ok(watcher) => Ok(watcher),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Err(
                CertWatchError::not_found("CertWatcher", &key.namespace, &key.name),
            ),
            Err(e) => Err(e.into()),
        }
    }

    fn dependents(&self, secret: &ObjectKey) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self
            .watchers
            .state()
            .iter()
            .filter(|w| w.spec.secret.namespace == secret.namespace && w.spec.secret.name == secret.name)
            .map(|w| w.key())
            .collect();
        keys.sort();
        keys
    }

    async fn update_status(&self, watcher: &CertWatcher) -> Result<CertWatcher> {
        let key = watcher.key();
        let api: Api<CertWatcher> = Api::namespaced(self.client.clone(), &key.namespace);

        // resourceVersion makes the merge patch conditional: the API server
        // answers 409 when the object changed since it was read.
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": watcher.metadata.resource_version,
            },
            "status": watcher.status,
        });

        match api
            .patch_status(&key.name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(&patch))
            .await
        {
            Ok(updated) => {
                debug!(
                    resource.namespace = %key.namespace,
                    resource.name = %key.name,
                    phase = %updated.phase(),
                    "status updated"
                );
                Ok(updated)
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                Err(CertWatchError::Conflict(key.to_string()))
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Err(
                CertWatchError::not_found("CertWatcher", &key.namespace, &key.name),
            ),
            Err(e) => Err(e.into()),
        }
    }
}

/// Publishes events through the kube-runtime [`Recorder`]
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    pub fn new(client: Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, watcher: &CertWatcher, kind: EventKind, reason: &str, note: String) {
        let event = Event {
            type_: match kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconcile".to_string(),
            secondary: None,
        };

        // Events are best effort; a failed publish never fails the cycle.
        if let Err(e) = self.recorder.publish(&event, &watcher.object_ref(&())).await {
            warn!(
                resource.namespace = watcher.metadata.namespace.as_deref().unwrap_or("default"),
                resource.name = watcher.metadata.name.as_deref().unwrap_or("unknown"),
                error = %e,
                "failed to publish event"
            );
        }
    }
}
