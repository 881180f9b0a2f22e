//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `cert_watch_reconciliations_total` - Reconciliations by controller
//! - `cert_watch_reconciliation_errors_total` - Failed reconciliations by controller and error kind
//! - `cert_watch_reconciliation_duration_seconds` - Reconcile duration by controller
//! - `cert_watch_watchers_marked_pending_total` - Ready to ActionPending transitions
//! - `cert_watch_deferrals_total` - Dependents skipped because they were not Ready
//! - `cert_watch_actions_dispatched_total` - Successful actions by kind
//! - `cert_watch_actions_failed_total` - Failed actions by kind and error kind
//! - `cert_watch_export_duration_seconds` - Export pipeline duration
//! - `cert_watch_export_failures_total` - Failed exports
//! - `cert_watch_requeues_total` - Requeues by trigger

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cert_watch_reconciliations_total",
            "Total number of reconciliations by controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cert_watch_reconciliation_errors_total",
            "Total number of reconciliation errors by controller and error kind",
        ),
        &["controller", "error_kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "cert_watch_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static WATCHERS_MARKED_PENDING_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cert_watch_watchers_marked_pending_total",
        "Total number of CertWatchers marked ActionPending after a Secret change",
    )
    .expect("Failed to create WATCHERS_MARKED_PENDING_TOTAL metric - this should never happen")
});

static DEFERRALS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cert_watch_deferrals_total",
        "Total number of dependent CertWatchers deferred because they were not Ready",
    )
    .expect("Failed to create DEFERRALS_TOTAL metric - this should never happen")
});

static ACTIONS_DISPATCHED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cert_watch_actions_dispatched_total",
            "Total number of successfully dispatched actions by action kind",
        ),
        &["action"],
    )
    .expect("Failed to create ACTIONS_DISPATCHED_TOTAL metric - this should never happen")
});

static ACTIONS_FAILED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cert_watch_actions_failed_total",
            "Total number of failed actions by action kind and error kind",
        ),
        &["action", "error_kind"],
    )
    .expect("Failed to create ACTIONS_FAILED_TOTAL metric - this should never happen")
});

static EXPORT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "cert_watch_export_duration_seconds",
            "Duration of the certificate export pipeline in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create EXPORT_DURATION metric - this should never happen")
});

static EXPORT_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cert_watch_export_failures_total",
        "Total number of failed certificate exports",
    )
    .expect("Failed to create EXPORT_FAILURES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cert_watch_requeues_total",
            "Total number of requeues by trigger",
        ),
        &["trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(WATCHERS_MARKED_PENDING_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEFERRALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACTIONS_DISPATCHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACTIONS_FAILED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXPORT_DURATION.clone()))?;
    REGISTRY.register(Box::new(EXPORT_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str, error_kind: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller, error_kind])
        .inc();
}

pub fn observe_reconciliation_duration(controller: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

pub fn increment_watchers_marked_pending() {
    WATCHERS_MARKED_PENDING_TOTAL.inc();
}

pub fn increment_deferrals() {
    DEFERRALS_TOTAL.inc();
}

pub fn increment_actions_dispatched(action: &str) {
    ACTIONS_DISPATCHED_TOTAL.with_label_values(&[action]).inc();
}

pub fn increment_actions_failed(action: &str, error_kind: &str) {
    ACTIONS_FAILED_TOTAL
        .with_label_values(&[action, error_kind])
        .inc();
}

pub fn observe_export_duration(duration: f64) {
    EXPORT_DURATION.observe(duration);
}

pub fn increment_export_failures() {
    EXPORT_FAILURES_TOTAL.inc();
}

pub fn increment_requeues(trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger]).inc();
}
