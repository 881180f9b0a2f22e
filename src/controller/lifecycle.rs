//! # CertWatcher Lifecycle
//!
//! State machine driven by the CertWatcher controller:
//!
//! ```text
//! Uninitialized --(secret found)--> Ready <--(actions succeeded)-- ActionPending
//!                                     \--(secret changed)-------------^
//! ```
//!
//! - Uninitialized: fetch the Secret, store its checksum, move to Ready
//! - ActionPending: export the Secret, dispatch every enabled action, move to Ready
//! - Ready: nothing to do until the change detector marks the watcher
//!
//! Failures leave the phase untouched, record the error in `status.message`
//! and are retried by the error policy. The export workspace is removed
//! whatever the outcome of dispatch.

use crate::actions::EVENT_REASON;
use crate::checksum::secret_fingerprint;
use crate::constants::{MESSAGE_INITIALIZED, MESSAGE_WAITING};
use crate::controller::context::{backoff_key, Context};
use crate::crd::{CertWatcher, CertWatcherStatus, LifecyclePhase};
use crate::error::{CertWatchError, Result};
use crate::export::ExportOptions;
use crate::observability::metrics;
use crate::store::EventKind;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

pub const CONTROLLER: &str = "certwatcher";

/// Reconcile entry point of the CertWatcher controller
pub async fn reconcile_watcher(watcher: Arc<CertWatcher>, ctx: Arc<Context>) -> Result<Action> {
    let key = watcher.key();
    let span = info_span!(
        "certwatcher.reconcile",
        resource.kind = "CertWatcher",
        resource.namespace = %key.namespace,
        resource.name = %key.name,
        phase = %watcher.phase()
    );

    let start = Instant::now();
    metrics::increment_reconciliations(CONTROLLER);

    let deadline = ctx.config.reconcile_timeout();
    let result =
        match tokio::time::timeout(deadline, run_cycle(&ctx, &watcher).instrument(span)).await {
            Ok(result) => result,
            Err(_) => {
                let error = CertWatchError::DeadlineExceeded(deadline);
                record_failure(&ctx, &watcher, &error, true).await;
                Err(error)
            }
        };
    metrics::observe_reconciliation_duration(CONTROLLER, start.elapsed().as_secs_f64());

    if result.is_ok() {
        ctx.backoff
            .reset(&backoff_key("CertWatcher", &key.namespace, &key.name));
    }
    result
}

/// Run one lifecycle step for `watcher`
pub async fn run_cycle(ctx: &Context, watcher: &CertWatcher) -> Result<Action> {
    match watcher.phase() {
        LifecyclePhase::Uninitialized => initialize(ctx, watcher).await,
        LifecyclePhase::ActionPending => process_actions(ctx, watcher).await,
        LifecyclePhase::Ready => {
            debug!("CertWatcher Ready, waiting for Secret changes");
            Ok(Action::await_change())
        }
    }
}

async fn initialize(ctx: &Context, watcher: &CertWatcher) -> Result<Action> {
    let secret_key = watcher.spec.secret.key();
    let checksum = match ctx.store.get_secret(&secret_key).await {
        Ok(secret) => secret_fingerprint(&secret),
        Err(e) => Err(e),
    };
    let checksum = match checksum {
        Ok(checksum) => checksum,
        Err(e) => {
            record_failure(ctx, watcher, &e, true).await;
            return Err(e);
        }
    };

    let mut updated = watcher.clone();
    updated.status = Some(CertWatcherStatus {
        lifecycle_phase: LifecyclePhase::Ready,
        last_checksum: Some(checksum),
        last_update: Some(chrono::Utc::now().to_rfc3339()),
        message: Some(MESSAGE_INITIALIZED.to_string()),
    });
    let updated = ctx.store.update_status(&updated).await?;

    info!("CertWatcher initialized for Secret {}", secret_key);
    ctx.events
        .publish(
            &updated,
            EventKind::Normal,
            EVENT_REASON,
            MESSAGE_INITIALIZED.to_string(),
        )
        .await;
    Ok(Action::await_change())
}

async fn process_actions(ctx: &Context, watcher: &CertWatcher) -> Result<Action> {
    let secret = match ctx.store.get_secret(&watcher.spec.secret.key()).await {
        Ok(secret) => secret,
        Err(e) => {
            record_failure(ctx, watcher, &e, true).await;
            return Err(e);
        }
    };

    let workspace = match ctx
        .exporter
        .export(&secret, ExportOptions::from(&watcher.spec))
        .await
    {
        Ok(workspace) => workspace,
        Err(failure) => {
            let e = failure.into_error();
            record_failure(ctx, watcher, &e, true).await;
            return Err(e);
        }
    };

    let dispatched = ctx.dispatcher.dispatch(watcher, &workspace).await;
    if let Err(e) = workspace.close() {
        warn!(error = %e, "Failed to remove export workspace");
    }

    if let Err(e) = dispatched {
        // The dispatcher already published a Warning event for the failing action.
        record_failure(ctx, watcher, &e, false).await;
        return Err(e);
    }

    let mut updated = watcher.clone();
    let previous = updated.status.take().unwrap_or_default();
    updated.status = Some(CertWatcherStatus {
        lifecycle_phase: LifecyclePhase::Ready,
        last_checksum: previous.last_checksum,
        last_update: Some(chrono::Utc::now().to_rfc3339()),
        message: Some(MESSAGE_WAITING.to_string()),
    });
    let updated = ctx.store.update_status(&updated).await?;

    info!("Action processing finished successfully");
    ctx.events
        .publish(
            &updated,
            EventKind::Normal,
            EVENT_REASON,
            "Action processing finished successfully".to_string(),
        )
        .await;
    Ok(Action::await_change())
}

/// Record `error` in the status message, keeping the phase. The write is
/// skipped when the message is already current so a persistent failure does
/// not re-trigger reconciles through its own status updates.
async fn record_failure(ctx: &Context, watcher: &CertWatcher, error: &CertWatchError, publish: bool) {
    let message = error.to_string();
    if publish {
        ctx.events
            .publish(watcher, EventKind::Warning, EVENT_REASON, message.clone())
            .await;
    }
    if watcher.message() == Some(message.as_str()) {
        return;
    }

    let mut updated = watcher.clone();
    let mut status = updated.status.take().unwrap_or_default();
    status.message = Some(message);
    status.last_update = Some(chrono::Utc::now().to_rfc3339());
    updated.status = Some(status);

    if let Err(e) = ctx.store.update_status(&updated).await {
        warn!(error = %e, "Failed to record failure in CertWatcher status");
    }
}
