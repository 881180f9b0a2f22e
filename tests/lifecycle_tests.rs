//! # Lifecycle Tests
//!
//! Exercises the CertWatcher state machine end to end with fake backends:
//! initialization, a successful action cycle, failures that keep the watcher
//! ActionPending, workspace cleanup and the retry policy.

mod common;

use cert_watch::checksum::secret_fingerprint;
use cert_watch::config::ControllerConfig;
use cert_watch::constants::{MESSAGE_INITIALIZED, MESSAGE_WAITING};
use cert_watch::controller::lifecycle::run_cycle;
use cert_watch::controller::{reconcile_secret, reconcile_watcher};
use cert_watch::crd::{Actions, EchoAction, EmailAction, LifecyclePhase};
use cert_watch::error::CertWatchError;
use cert_watch::runtime::error_policy::watcher_error_policy;
use cert_watch::store::{EventKind, ObjectKey};
use common::*;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

fn secret_key() -> ObjectKey {
    ObjectKey::new("certs", "web-tls")
}

fn echo() -> Actions {
    Actions {
        echo: Some(EchoAction { enabled: true }),
        ..Actions::default()
    }
}

#[tokio::test]
async fn test_initialization_stores_checksum_and_becomes_ready() {
    let harness = Harness::new();
    let secret = tls_secret("certs", "web-tls", Some(KEY_PEM), Some(CRT_PEM));
    let fingerprint = secret_fingerprint(&secret).unwrap();
    harness.store.put_secret(secret);
    let stored = harness
        .store
        .put_watcher(watcher("apps", "web", &secret_key(), echo()));

    let action = run_cycle(&harness.context, &stored).await.unwrap();
    assert_eq!(action, Action::await_change());

    let updated = harness.store.watcher(&stored.key());
    assert_eq!(updated.phase(), LifecyclePhase::Ready);
    assert_eq!(updated.last_checksum(), Some(fingerprint.as_str()));
    assert_eq!(updated.message(), Some(MESSAGE_INITIALIZED));
    assert_eq!(
        harness.events.notes(EventKind::Normal),
        vec![MESSAGE_INITIALIZED.to_string()]
    );
}

#[tokio::test]
async fn test_initialization_without_secret_records_error_once() {
    let harness = Harness::new();
    let stored = harness
        .store
        .put_watcher(watcher("apps", "web", &secret_key(), echo()));

    let result = run_cycle(&harness.context, &stored).await;
    assert!(matches!(result, Err(CertWatchError::NotFound { .. })));

    let updated = harness.store.watcher(&stored.key());
    assert_eq!(updated.phase(), LifecyclePhase::Uninitialized);
    assert_eq!(updated.message(), Some("Secret certs/web-tls not found"));
    assert_eq!(harness.store.status_writes(), 1);

    // Same failure again: the message is already current, nothing is written.
    let result = run_cycle(&harness.context, &updated).await;
    assert!(result.is_err());
    assert_eq!(harness.store.status_writes(), 1);
    assert_eq!(harness.events.notes(EventKind::Warning).len(), 2);
}

#[tokio::test]
async fn test_ready_watcher_waits_for_changes() {
    let harness = Harness::new();
    let stored = harness.store.put_watcher(with_status(
        watcher("apps", "web", &secret_key(), echo()),
        LifecyclePhase::Ready,
        Some("checksum"),
    ));

    let action = run_cycle(&harness.context, &stored).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(harness.store.status_writes(), 0);
    assert!(harness.events.all().is_empty());
}

#[tokio::test]
async fn test_successful_cycle_returns_to_ready_and_removes_workspace() {
    let harness = Harness::new();
    harness
        .store
        .put_secret(tls_secret("certs", "web-tls", Some(KEY_PEM), Some(CRT_PEM)));
    let stored = harness.store.put_watcher(with_status(
        watcher("apps", "web", &secret_key(), echo()),
        LifecyclePhase::ActionPending,
        Some("new-checksum"),
    ));

    let action = run_cycle(&harness.context, &stored).await.unwrap();
    assert_eq!(action, Action::await_change());

    let updated = harness.store.watcher(&stored.key());
    assert_eq!(updated.phase(), LifecyclePhase::Ready);
    assert_eq!(updated.last_checksum(), Some("new-checksum"));
    assert_eq!(updated.message(), Some(MESSAGE_WAITING));
    assert_eq!(
        harness.events.notes(EventKind::Normal),
        vec![
            "ECHO: Good morning to certs/web-tls".to_string(),
            "Action processing finished successfully".to_string(),
        ]
    );
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_secret_without_certificate_keeps_watcher_pending() {
    let harness = Harness::new();
    harness
        .store
        .put_secret(tls_secret("certs", "web-tls", Some(KEY_PEM), None));
    let stored = harness.store.put_watcher(with_status(
        watcher("apps", "web", &secret_key(), echo()),
        LifecyclePhase::ActionPending,
        Some("new-checksum"),
    ));

    let result = run_cycle(&harness.context, &stored).await;
    assert!(matches!(result, Err(CertWatchError::MissingField { .. })));

    let updated = harness.store.watcher(&stored.key());
    assert_eq!(updated.phase(), LifecyclePhase::ActionPending);
    assert_eq!(
        updated.message(),
        Some("secret certs/web-tls does not have value for tls.crt")
    );
    assert!(harness.events.notes(EventKind::Normal).is_empty());
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_failed_action_keeps_watcher_pending_and_cleans_up() {
    let harness = Harness::new();
    *harness.mail.fail.lock().unwrap() = Some("connection refused".to_string());
    harness
        .store
        .put_secret(tls_secret("certs", "web-tls", Some(KEY_PEM), Some(CRT_PEM)));
    let actions = Actions {
        email: Some(EmailAction {
            enabled: true,
            to: "ops@example.com".to_string(),
            attachments: vec!["tls.all.zip".to_string()],
            ..EmailAction::default()
        }),
        ..echo()
    };
    let stored = harness.store.put_watcher(with_status(
        watcher("apps", "web", &secret_key(), actions),
        LifecyclePhase::ActionPending,
        Some("new-checksum"),
    ));

    let result = run_cycle(&harness.context, &stored).await;
    assert!(matches!(result, Err(CertWatchError::Delivery(_))));

    let updated = harness.store.watcher(&stored.key());
    assert_eq!(updated.phase(), LifecyclePhase::ActionPending);
    assert_eq!(
        updated.message(),
        Some("delivery error: smtp.example.com:587: connection refused")
    );
    assert_eq!(
        harness.events.notes(EventKind::Warning),
        vec!["EMAIL: delivery error: smtp.example.com:587: connection refused".to_string()]
    );
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_deadline_exceeded_is_recorded_and_workspace_dropped() {
    let harness = Harness::with_config(ControllerConfig {
        reconcile_timeout_secs: 1,
        ..ControllerConfig::default()
    });
    *harness.mail.delay.lock().unwrap() = Some(Duration::from_secs(30));
    harness
        .store
        .put_secret(tls_secret("certs", "web-tls", Some(KEY_PEM), Some(CRT_PEM)));
    let actions = Actions {
        email: Some(EmailAction {
            enabled: true,
            to: "ops@example.com".to_string(),
            ..EmailAction::default()
        }),
        ..Actions::default()
    };
    let stored = harness.store.put_watcher(with_status(
        watcher("apps", "web", &secret_key(), actions),
        LifecyclePhase::ActionPending,
        Some("new-checksum"),
    ));

    let result = reconcile_watcher(Arc::new(stored.clone()), Arc::clone(&harness.context)).await;
    assert!(matches!(result, Err(CertWatchError::DeadlineExceeded(_))));

    let updated = harness.store.watcher(&stored.key());
    assert_eq!(updated.phase(), LifecyclePhase::ActionPending);
    assert!(updated.message().unwrap().contains("deadline"));
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_error_policy_backs_off_fast_then_slow_and_resets() {
    let harness = Harness::new();
    let stored = harness
        .store
        .put_watcher(watcher("apps", "web", &secret_key(), echo()));
    let watcher = Arc::new(stored);
    let error = CertWatchError::not_found("Secret", "certs", "web-tls");

    for _ in 0..5 {
        let action = watcher_error_policy(Arc::clone(&watcher), &error, Arc::clone(&harness.context));
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
    }
    let action = watcher_error_policy(Arc::clone(&watcher), &error, Arc::clone(&harness.context));
    assert_eq!(action, Action::requeue(Duration::from_secs(30)));

    // A successful reconcile clears the failure count.
    harness
        .store
        .put_secret(tls_secret("certs", "web-tls", Some(KEY_PEM), Some(CRT_PEM)));
    let current = harness.store.watcher(&watcher.key());
    reconcile_watcher(Arc::new(current), Arc::clone(&harness.context))
        .await
        .unwrap();
    let action = watcher_error_policy(Arc::clone(&watcher), &error, Arc::clone(&harness.context));
    assert_eq!(action, Action::requeue(Duration::from_secs(5)));
}

/// Secret rotation from initialization through one full action cycle
#[tokio::test]
async fn test_rotation_runs_actions_once_per_change() {
    let harness = Harness::new();
    let original = tls_secret("certs", "web-tls", Some(KEY_PEM), Some(CRT_PEM));
    harness.store.put_secret(original.clone());
    let stored = harness
        .store
        .put_watcher(watcher("apps", "web", &secret_key(), echo()));
    let key = stored.key();

    // Initialize, then replay the unchanged Secret: nothing to do.
    run_cycle(&harness.context, &stored).await.unwrap();
    reconcile_secret(Arc::new(original), Arc::clone(&harness.context))
        .await
        .unwrap();
    assert_eq!(harness.store.watcher(&key).phase(), LifecyclePhase::Ready);

    // Rotate the certificate.
    let rotated = tls_secret("certs", "web-tls", Some(KEY_PEM), Some(b"rotated"));
    harness.store.put_secret(rotated.clone());
    reconcile_secret(Arc::new(rotated.clone()), Arc::clone(&harness.context))
        .await
        .unwrap();
    let pending = harness.store.watcher(&key);
    assert_eq!(pending.phase(), LifecyclePhase::ActionPending);
    assert_eq!(
        pending.last_checksum(),
        Some(secret_fingerprint(&rotated).unwrap().as_str())
    );

    run_cycle(&harness.context, &pending).await.unwrap();
    assert_eq!(harness.store.watcher(&key).phase(), LifecyclePhase::Ready);

    let echoes = harness
        .events
        .notes(EventKind::Normal)
        .into_iter()
        .filter(|n| n.starts_with("ECHO"))
        .count();
    assert_eq!(echoes, 1);
}
