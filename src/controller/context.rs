//! # Controller Context
//!
//! Shared state handed to both controllers.

use crate::actions::ActionDispatcher;
use crate::config::ControllerConfig;
use crate::controller::backoff::{BackoffTracker, FastSlowBackoff};
use crate::export::CertificateExporter;
use crate::store::{EventPublisher, ResourceStore};
use std::sync::Arc;

pub struct Context {
    pub config: Arc<ControllerConfig>,
    pub store: Arc<dyn ResourceStore>,
    pub events: Arc<dyn EventPublisher>,
    pub exporter: CertificateExporter,
    pub dispatcher: ActionDispatcher,
    /// Per-resource retry state used by the error policy
    pub backoff: BackoffTracker,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("exporter", &self.exporter)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        config: Arc<ControllerConfig>,
        store: Arc<dyn ResourceStore>,
        events: Arc<dyn EventPublisher>,
        exporter: CertificateExporter,
        dispatcher: ActionDispatcher,
    ) -> Self {
        let backoff = BackoffTracker::new(FastSlowBackoff::from_config(&config));
        Self {
            config,
            store,
            events,
            exporter,
            dispatcher,
            backoff,
        }
    }
}

/// Backoff key of a resource
pub fn backoff_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind}:{namespace}/{name}")
}
