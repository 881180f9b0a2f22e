//! # Error Policy
//!
//! Requeue decisions for failed reconciles. Each resource gets its own
//! fast-then-slow backoff; a success resets it.

use crate::controller::context::{backoff_key, Context};
use crate::controller::{lifecycle, secret_watch};
use crate::crd::CertWatcher;
use crate::error::CertWatchError;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info};

pub fn watcher_error_policy(
    watcher: Arc<CertWatcher>,
    error: &CertWatchError,
    ctx: Arc<Context>,
) -> Action {
    let key = watcher.key();
    retry(
        &ctx,
        lifecycle::CONTROLLER,
        "CertWatcher",
        &key.namespace,
        &key.name,
        error,
    )
}

pub fn secret_error_policy(secret: Arc<Secret>, error: &CertWatchError, ctx: Arc<Context>) -> Action {
    retry(
        &ctx,
        secret_watch::CONTROLLER,
        "Secret",
        secret.metadata.namespace.as_deref().unwrap_or("default"),
        secret.metadata.name.as_deref().unwrap_or("unknown"),
        error,
    )
}

fn retry(
    ctx: &Context,
    controller: &str,
    kind: &str,
    namespace: &str,
    name: &str,
    error: &CertWatchError,
) -> Action {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.kind = kind,
        resource.namespace = namespace,
        resource.name = name,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {} {}/{}: {}", kind, namespace, name, error);
    metrics::increment_reconciliation_errors(controller, error.kind());

    let (delay, failures) = ctx.backoff.record_failure(&backoff_key(kind, namespace, name));
    info!(
        "Retrying in {}s (failures: {}, trigger source: error-backoff)",
        delay.as_secs(),
        failures
    );

    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}
