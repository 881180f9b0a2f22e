//! # Email Action
//!
//! Builds the outgoing message from the action configuration and delivers it
//! through a [`MailTransport`]. The production transport is lettre's async
//! SMTP client.

use crate::config::EmailServerConfig;
use crate::crd::EmailAction;
use crate::error::{CertWatchError, Result};
use crate::export::Workspace;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyContentType {
    Plain,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub name: String,
    pub path: PathBuf,
}

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub content_type: BodyContentType,
    pub attachments: Vec<MailAttachment>,
}

impl OutgoingMail {
    /// Resolve the action configuration against the server defaults and the
    /// exported files
    pub fn build(
        action: &EmailAction,
        server: &EmailServerConfig,
        workspace: &Workspace,
    ) -> Result<Self> {
        let from = action
            .from
            .as_deref()
            .filter(|f| !f.is_empty())
            .or(server.from.as_deref())
            .ok_or_else(|| {
                CertWatchError::Config(
                    "no sender address: set actions.email.from or from in the server configuration"
                        .to_string(),
                )
            })?
            .to_string();

        let to = split_addresses(Some(&action.to));
        if to.is_empty() {
            return Err(CertWatchError::Config(
                "actions.email.to has no recipients".to_string(),
            ));
        }

        let content_type = match action.body_content_type.as_deref() {
            Some("text/html") => BodyContentType::Html,
            _ => BodyContentType::Plain,
        };

        let attachments = action
            .attachments
            .iter()
            .map(|name| match workspace.exported(name) {
                Some(path) => Ok(MailAttachment {
                    name: name.clone(),
                    path,
                }),
                None => Err(CertWatchError::Config(format!(
                    "attachment {name} is not an exported file (expected one of {})",
                    workspace.names().all().join(", ")
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            from,
            to,
            cc: split_addresses(action.cc.as_deref()),
            bcc: split_addresses(action.bcc.as_deref()),
            subject: action.subject.clone().unwrap_or_default(),
            body: action.body_template.clone().unwrap_or_default(),
            content_type,
            attachments,
        })
    }
}

/// Split a comma-separated address list, dropping empty entries
pub fn split_addresses(list: Option<&str>) -> Vec<String> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Delivers mail to an SMTP server
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, server: &EmailServerConfig, mail: &OutgoingMail) -> Result<()>;
}

/// [`MailTransport`] using lettre's tokio SMTP transport
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn transport(&self, server: &EmailServerConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(server.host.as_str())
                .port(server.port)
                .timeout(Some(self.timeout));

        if server.encryption.is_implicit_tls() || server.encryption.is_starttls() {
            let parameters = TlsParameters::new(server.host.clone()).map_err(|e| {
                CertWatchError::Config(format!("invalid TLS settings for {}: {e}", server.host))
            })?;
            builder = builder.tls(if server.encryption.is_implicit_tls() {
                Tls::Wrapper(parameters)
            } else {
                Tls::Required(parameters)
            });
        }

        if let Some(username) = &server.username {
            let password = server
                .password
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        Ok(builder.build())
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| CertWatchError::Config(format!("invalid e-mail address {address:?}: {e}")))
}

async fn render(mail: &OutgoingMail) -> Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&mail.from)?)
        .subject(mail.subject.clone());
    for address in &mail.to {
        builder = builder.to(mailbox(address)?);
    }
    for address in &mail.cc {
        builder = builder.cc(mailbox(address)?);
    }
    for address in &mail.bcc {
        builder = builder.bcc(mailbox(address)?);
    }

    let body_type = match mail.content_type {
        BodyContentType::Plain => ContentType::TEXT_PLAIN,
        BodyContentType::Html => ContentType::TEXT_HTML,
    };
    let mut parts = MultiPart::mixed().singlepart(
        SinglePart::builder()
            .header(body_type)
            .body(mail.body.clone()),
    );

    let octet_stream = ContentType::parse("application/octet-stream")
        .map_err(|e| CertWatchError::Config(format!("invalid attachment content type: {e}")))?;
    for attachment in &mail.attachments {
        let contents = tokio::fs::read(&attachment.path).await.map_err(|e| {
            CertWatchError::Config(format!("cannot read attachment {}: {e}", attachment.name))
        })?;
        parts = parts.singlepart(
            Attachment::new(attachment.name.clone()).body(contents, octet_stream.clone()),
        );
    }

    builder
        .multipart(parts)
        .map_err(|e| CertWatchError::Config(format!("cannot build e-mail message: {e}")))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, server: &EmailServerConfig, mail: &OutgoingMail) -> Result<()> {
        let message = render(mail).await?;
        let transport = self.transport(server)?;
        transport
            .send(message)
            .await
            .map_err(|e| CertWatchError::Delivery(format!("{}:{}: {e}", server.host, server.port)))?;
        Ok(())
    }
}
