//! # Watch Loop
//!
//! Runs the CertWatcher and Secret controllers side by side. The Secret
//! controller only starts once the CertWatcher index has its initial list,
//! so no Secret event is evaluated against an empty dependents index.

use crate::constants::TLS_SECRET_TYPE;
use crate::controller::{reconcile_secret, reconcile_watcher};
use crate::runtime::error_policy::{secret_error_policy, watcher_error_policy};
use crate::runtime::initialization::InitializationResult;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run both controllers until a shutdown signal is received
pub async fn run_watch_loop(init: InitializationResult) -> anyhow::Result<()> {
    let InitializationResult {
        client,
        watcher_controller,
        store,
        context,
        server_state,
    } = init;

    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_state.set_ready(false);
        }
    });

    let watchers = watcher_controller
        .shutdown_on_signal()
        .run(reconcile_watcher, watcher_error_policy, Arc::clone(&context))
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!("Reconciled CertWatcher {}", obj),
                Err(e) => warn!("CertWatcher controller error: {}", e),
            }
        });

    let secrets: Api<Secret> = Api::all(client);
    let secret_controller = async move {
        if let Err(e) = store.wait_until_ready().await {
            error!("Secret controller not started: {}", e);
            return;
        }
        info!("CertWatcher index ready, starting Secret controller");

        Controller::new(
            secrets,
            watcher::Config::default().fields(&format!("type={TLS_SECRET_TYPE}")),
        )
        .shutdown_on_signal()
        .run(reconcile_secret, secret_error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!("Reconciled Secret {}", obj),
                Err(e) => warn!("Secret controller error: {}", e),
            }
        })
        .await;
    };

    tokio::join!(watchers, secret_controller);

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}
