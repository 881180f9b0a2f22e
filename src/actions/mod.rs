//! # Action Dispatcher
//!
//! Runs the enabled actions of a CertWatcher against an export workspace, in
//! the fixed order Echo, Email, Scp, Job. Dispatch stops at the first failing
//! action and returns its error; actions that already ran are not undone.
//!
//! Backends sit behind traits so the dispatcher can be driven without an SMTP
//! server, an SSH host or a cluster:
//!
//! - `email.rs` - [`MailTransport`] and message building
//! - `scp.rs` - [`RemoteCopy`] and credential parsing
//! - `job.rs` - [`JobSubmitter`] and Job construction

pub mod email;
pub mod job;
pub mod scp;

pub use email::{MailTransport, OutgoingMail, SmtpMailer};
pub use job::{JobSubmitter, KubeJobSubmitter};
pub use scp::{RemoteCopy, RemoteTarget, ScpCredentials, Ssh2Copy};

use crate::config::EmailServerConfig;
use crate::crd::{Action, ActionKind, CertWatcher, EmailAction, JobAction, ScpAction};
use crate::error::{CertWatchError, Result};
use crate::export::Workspace;
use crate::observability::metrics;
use crate::store::{EventKind, EventPublisher, ObjectKey, ResourceStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Event reason used for every dispatch event
pub const EVENT_REASON: &str = "CertWatcherProcessing";

/// Action backends used by the dispatcher
#[derive(Clone)]
pub struct ActionBackends {
    pub mail: Arc<dyn MailTransport>,
    pub copier: Arc<dyn RemoteCopy>,
    pub jobs: Arc<dyn JobSubmitter>,
}

impl std::fmt::Debug for ActionBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionBackends").finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ActionDispatcher {
    store: Arc<dyn ResourceStore>,
    events: Arc<dyn EventPublisher>,
    backends: ActionBackends,
    /// Server configuration from EMAIL_CONFIG_FILE, used when an Email action
    /// does not name its own file
    default_email_config: Option<EmailServerConfig>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("default_email_config", &self.default_email_config)
            .finish_non_exhaustive()
    }
}

impl ActionDispatcher {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        events: Arc<dyn EventPublisher>,
        backends: ActionBackends,
        default_email_config: Option<EmailServerConfig>,
    ) -> Self {
        Self {
            store,
            events,
            backends,
            default_email_config,
        }
    }

    /// Run every enabled action of `watcher` against `workspace`
    pub async fn dispatch(&self, watcher: &CertWatcher, workspace: &Workspace) -> Result<()> {
        let key = watcher.key();

        for action in watcher.spec.actions.enabled() {
            let kind = action.kind();
            let span = info_span!(
                "action",
                action = kind.as_str(),
                resource.namespace = %key.namespace,
                resource.name = %key.name
            );

            let result = match action {
                Action::Echo(_) => {
                    self.echo(watcher).await;
                    Ok(())
                }
                Action::Email(email) => self.email(watcher, email, workspace).instrument(span).await,
                Action::Scp(scp) => self.scp(watcher, scp, workspace).instrument(span).await,
                Action::Job(job) => self.job(watcher, job).instrument(span).await,
            };

            match result {
                Ok(()) => metrics::increment_actions_dispatched(kind.as_str()),
                Err(e) => {
                    metrics::increment_actions_failed(kind.as_str(), e.kind());
                    warn!(
                        resource.namespace = %key.namespace,
                        resource.name = %key.name,
                        action = kind.as_str(),
                        error = %e,
                        "action failed"
                    );
                    self.warn(watcher, kind, &e).await;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    async fn echo(&self, watcher: &CertWatcher) {
        let secret = watcher.spec.secret.key();
        info!("ECHO: Good morning to {}", secret);
        self.events
            .publish(
                watcher,
                EventKind::Normal,
                EVENT_REASON,
                format!("ECHO: Good morning to {secret}"),
            )
            .await;
    }

    async fn email(
        &self,
        watcher: &CertWatcher,
        action: &EmailAction,
        workspace: &Workspace,
    ) -> Result<()> {
        let server = match action.config_file.as_deref().filter(|f| !f.is_empty()) {
            Some(path) => EmailServerConfig::load(Path::new(path)).await?,
            None => self.default_email_config.clone().ok_or_else(|| {
                CertWatchError::Config(
                    "email not configured: set actions.email.configFile or EMAIL_CONFIG_FILE"
                        .to_string(),
                )
            })?,
        };
        let mail = OutgoingMail::build(action, &server, workspace)?;

        self.events
            .publish(
                watcher,
                EventKind::Normal,
                EVENT_REASON,
                format!(
                    "EMAIL: Sending mail to {} via {}:{}",
                    action.to, server.host, server.port
                ),
            )
            .await;
        self.backends.mail.send(&server, &mail).await?;
        info!(
            recipients = mail.to.len() + mail.cc.len() + mail.bcc.len(),
            attachments = mail.attachments.len(),
            "email sent via {}:{}",
            server.host,
            server.port
        );
        Ok(())
    }

    async fn scp(&self, watcher: &CertWatcher, action: &ScpAction, workspace: &Workspace) -> Result<()> {
        let credential_key: ObjectKey = action.credential_secret.parse().map_err(|_invalid: CertWatchError| {
            CertWatchError::Config(format!(
                "invalid credentialSecret naming format {}",
                action.credential_secret
            ))
        })?;
        let credential_secret = self.store.get_secret(&credential_key).await?;
        let credentials = ScpCredentials::from_secret(&credential_secret, action.auth_type)?;
        let target = RemoteTarget {
            hostname: action.hostname.clone(),
            port: action.port(),
        };

        self.events
            .publish(
                watcher,
                EventKind::Normal,
                EVENT_REASON,
                format!("SCP: Sending files to {target}"),
            )
            .await;

        for file in &action.files {
            let local = workspace.exported(&file.name).ok_or_else(|| {
                CertWatchError::Config(format!("scp file {} is not an exported file", file.name))
            })?;
            let mode = file.mode_bits()?;
            let remote = file.destination();
            self.backends
                .copier
                .copy_file(&target, &credentials, &local, &remote, mode)
                .await?;
            info!("copied {} to {}:{} (mode {:o})", file.name, target, remote, mode);
        }
        Ok(())
    }

    async fn job(&self, watcher: &CertWatcher, action: &JobAction) -> Result<()> {
        let job = job::build_job(watcher, action, &job::random_suffix())?;
        let job_name = format!(
            "{}/{}",
            job.metadata.namespace.as_deref().unwrap_or("default"),
            job.metadata.name.as_deref().unwrap_or("unknown")
        );
        self.backends.jobs.submit(&job).await?;

        info!("submitted job {}", job_name);
        self.events
            .publish(
                watcher,
                EventKind::Normal,
                EVENT_REASON,
                format!("JOB: Submitted job {job_name}"),
            )
            .await;
        Ok(())
    }

    async fn warn(&self, watcher: &CertWatcher, kind: ActionKind, error: &CertWatchError) {
        self.events
            .publish(
                watcher,
                EventKind::Warning,
                EVENT_REASON,
                format!("{}: {error}", kind.as_str().to_uppercase()),
            )
            .await;
    }
}
