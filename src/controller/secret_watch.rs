//! # Change Detection
//!
//! Reacts to TLS Secret updates. For every CertWatcher referencing the Secret:
//!
//! - not Ready: deferred, the Secret is requeued after the deferral interval
//! - Ready with a different checksum: marked ActionPending with the new checksum
//! - Ready with the same checksum: left alone
//!
//! Dependents are handled independently; a failure on one never stops the
//! others. Failures are collected and reported together once all dependents
//! have been attempted.

use crate::checksum::secret_fingerprint;
use crate::constants::TLS_SECRET_TYPE;
use crate::controller::context::{backoff_key, Context};
use crate::crd::{CertWatcherStatus, LifecyclePhase};
use crate::error::{CertWatchError, Result};
use crate::observability::metrics;
use crate::store::{EventKind, ObjectKey};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

pub const CONTROLLER: &str = "secret";

/// Outcome of a change-detection pass over one Secret
#[derive(Debug, Default)]
pub struct DetectionReport {
    /// Dependents moved from Ready to ActionPending
    pub marked: Vec<ObjectKey>,
    /// Dependents that were not Ready
    pub deferred: Vec<ObjectKey>,
    /// Dependents whose checksum already matched, or that no longer reference the Secret
    pub unchanged: Vec<ObjectKey>,
    pub failed: Vec<(ObjectKey, CertWatchError)>,
}

impl DetectionReport {
    pub fn total(&self) -> usize {
        self.marked.len() + self.deferred.len() + self.unchanged.len() + self.failed.len()
    }
}

enum Outcome {
    Marked,
    Deferred,
    Unchanged,
}

/// Compare the Secret's fingerprint with every dependent CertWatcher
pub async fn detect_changes(ctx: &Context, secret: &Secret) -> Result<DetectionReport> {
    let mut report = DetectionReport::default();

    if secret.type_.as_deref() != Some(TLS_SECRET_TYPE) {
        return Ok(report);
    }

    let secret_key = ObjectKey::new(
        secret.metadata.namespace.as_deref().unwrap_or("default"),
        secret.metadata.name.as_deref().unwrap_or("unknown"),
    );
    let fingerprint = secret_fingerprint(secret)?;

    let dependents = ctx.store.dependents(&secret_key);
    if dependents.is_empty() {
        debug!("No CertWatchers reference Secret {}", secret_key);
        return Ok(report);
    }

    for key in dependents {
        match mark_dependent(ctx, &secret_key, &key, &fingerprint).await {
            Ok(Outcome::Marked) => report.marked.push(key),
            Ok(Outcome::Deferred) => report.deferred.push(key),
            Ok(Outcome::Unchanged) => report.unchanged.push(key),
            Err(e) => {
                warn!(
                    resource.namespace = %key.namespace,
                    resource.name = %key.name,
                    error = %e,
                    "Unable to mark CertWatcher for Secret {}",
                    secret_key
                );
                report.failed.push((key, e));
            }
        }
    }

    info!(
        secret = %secret_key,
        marked = report.marked.len(),
        deferred = report.deferred.len(),
        unchanged = report.unchanged.len(),
        failed = report.failed.len(),
        "Secret change detection finished"
    );
    Ok(report)
}

async fn mark_dependent(
    ctx: &Context,
    secret_key: &ObjectKey,
    key: &ObjectKey,
    fingerprint: &str,
) -> Result<Outcome> {
    // The index may lag behind the store; always act on a fresh read.
    let mut watcher = match ctx.store.get_watcher(key).await {
        Ok(watcher) => watcher,
        Err(CertWatchError::NotFound { .. }) => return Ok(Outcome::Unchanged),
        Err(e) => return Err(e),
    };
    if watcher.spec.secret.key() != *secret_key {
        return Ok(Outcome::Unchanged);
    }

    if watcher.phase() != LifecyclePhase::Ready {
        debug!(
            resource.namespace = %key.namespace,
            resource.name = %key.name,
            phase = %watcher.phase(),
            "CertWatcher not Ready, deferring"
        );
        metrics::increment_deferrals();
        return Ok(Outcome::Deferred);
    }

    if watcher.last_checksum() == Some(fingerprint) {
        return Ok(Outcome::Unchanged);
    }

    let previous = watcher.status.take().unwrap_or_default();
    watcher.status = Some(CertWatcherStatus {
        lifecycle_phase: LifecyclePhase::ActionPending,
        last_checksum: Some(fingerprint.to_string()),
        last_update: Some(chrono::Utc::now().to_rfc3339()),
        message: previous.message,
    });
    let updated = ctx.store.update_status(&watcher).await?;

    metrics::increment_watchers_marked_pending();
    info!(
        resource.namespace = %key.namespace,
        resource.name = %key.name,
        "Secret {} changed, CertWatcher marked ActionPending",
        secret_key
    );
    ctx.events
        .publish(
            &updated,
            EventKind::Normal,
            crate::actions::EVENT_REASON,
            format!("Secret {secret_key} changed, actions pending"),
        )
        .await;
    Ok(Outcome::Marked)
}

/// Reconcile entry point of the Secret controller
pub async fn reconcile_secret(secret: Arc<Secret>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = secret.metadata.namespace.as_deref().unwrap_or("default");
    let name = secret.metadata.name.as_deref().unwrap_or("unknown");
    let span = info_span!(
        "secret.reconcile",
        resource.kind = "Secret",
        resource.namespace = namespace,
        resource.name = name
    );

    let start = Instant::now();
    metrics::increment_reconciliations(CONTROLLER);

    let deadline = ctx.config.reconcile_timeout();
    let report = tokio::time::timeout(deadline, detect_changes(&ctx, &secret).instrument(span))
        .await
        .map_err(|_elapsed| CertWatchError::DeadlineExceeded(deadline))??;
    metrics::observe_reconciliation_duration(CONTROLLER, start.elapsed().as_secs_f64());

    if !report.failed.is_empty() {
        let summary = report
            .failed
            .iter()
            .map(|(key, e)| format!("{key}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CertWatchError::Dependents {
            failed: report.failed.len(),
            total: report.total(),
            summary,
        });
    }

    ctx.backoff.reset(&backoff_key("Secret", namespace, name));
    if report.deferred.is_empty() {
        Ok(Action::await_change())
    } else {
        metrics::increment_requeues("deferral");
        Ok(Action::requeue(ctx.config.deferral_requeue_duration()))
    }
}
