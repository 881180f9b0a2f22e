//! # Initialization
//!
//! Controller bootstrap: rustls provider, tracing, metrics, probe server,
//! Kubernetes client, CertWatcher index and the shared controller context.

use crate::actions::{ActionBackends, ActionDispatcher, KubeJobSubmitter, SmtpMailer, Ssh2Copy};
use crate::config::{ControllerConfig, EmailServerConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::controller::Context;
use crate::crd::CertWatcher;
use crate::export::{CertificateExporter, CommandTools};
use crate::observability;
use crate::store::{EventPublisher, KubeEventPublisher, KubeStore, ResourceStore};
use anyhow::{anyhow, Context as _, Result};
use kube::api::Api;
use kube::runtime::{watcher, Controller};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the watch loop needs to run both controllers
pub struct InitializationResult {
    pub client: Client,
    /// Controller for CertWatcher resources; its store backs the dependents index
    pub watcher_controller: Controller<CertWatcher>,
    pub store: Arc<KubeStore>,
    pub context: Arc<Context>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before any rustls client is built.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow!("Failed to install rustls crypto provider"))?;

    let config = Arc::new(ControllerConfig::from_env());
    let server_config = ServerConfig::from_env();

    observability::logging::init_logging(&config).context("Failed to initialize logging")?;

    info!("Starting Cert Watch controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let port = server_config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!("HTTP server error: {}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let tools = CommandTools::from_config(&config);
    tools.check_available();
    let exporter = CertificateExporter::new(Arc::new(tools));

    let default_email_config = load_default_email_config(&config).await;

    let watchers: Api<CertWatcher> = Api::all(client.clone());
    let watcher_controller = Controller::new(watchers, watcher::Config::default());
    let store = Arc::new(KubeStore::new(client.clone(), watcher_controller.store()));
    let events = Arc::new(KubeEventPublisher::new(client.clone(), config.pod_name.clone()));

    let backends = ActionBackends {
        mail: Arc::new(SmtpMailer::new(config.action_timeout())),
        copier: Arc::new(Ssh2Copy::new(config.action_timeout())),
        jobs: Arc::new(KubeJobSubmitter::new(client.clone())),
    };
    let dispatcher = ActionDispatcher::new(
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        Arc::clone(&events) as Arc<dyn EventPublisher>,
        backends,
        default_email_config,
    );

    let context = Arc::new(Context::new(
        Arc::clone(&config),
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        events,
        exporter,
        dispatcher,
    ));

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        watcher_controller,
        store,
        context,
        server_state,
    })
}

/// A broken EMAIL_CONFIG_FILE only disables the fallback; Email actions
/// naming their own file keep working.
async fn load_default_email_config(config: &ControllerConfig) -> Option<EmailServerConfig> {
    let path = config.email_config_file.as_deref()?;
    match EmailServerConfig::load(path).await {
        Ok(email) => {
            info!(
                "Loaded default email configuration from {} ({}:{})",
                path.display(),
                email.host,
                email.port
            );
            Some(email)
        }
        Err(e) => {
            warn!("Ignoring default email configuration: {}", e);
            None
        }
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
