//! # Actions
//!
//! Actions performed after a watched Secret changes. Each action is optional
//! and carries its own `enabled` flag; enabled actions always run in the fixed
//! order Echo, Email, Scp, Job.

use crate::constants::{DEFAULT_SCP_FILE_MODE, DEFAULT_SCP_PORT};
use crate::error::{CertWatchError, Result};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action configuration of a CertWatcher
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Actions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<EchoAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scp: Option<ScpAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobAction>,
}

/// Logs a greeting naming the Secret. Useful to verify the pipeline end to end.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EchoAction {
    #[serde(default)]
    pub enabled: bool,
}

/// Sends the exported files by e-mail
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailAction {
    #[serde(default)]
    pub enabled: bool,
    /// Properties file describing the SMTP server. Falls back to the
    /// controller-wide EMAIL_CONFIG_FILE when absent.
    #[serde(default)]
    pub config_file: Option<String>,
    /// Sender address. Overrides the `from` property of the server file.
    #[serde(default)]
    pub from: Option<String>,
    /// Comma-separated recipients
    pub to: String,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body_template: Option<String>,
    /// MIME type of the body, e.g. "text/plain" or "text/html"
    #[serde(default)]
    pub body_content_type: Option<String>,
    /// Exported filenames attached to the message, e.g. "tls.all.zip"
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Copies exported files to a remote host over SSH
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScpAction {
    #[serde(default)]
    pub enabled: bool,
    pub hostname: String,
    /// SSH port (defaults to 22)
    #[serde(default)]
    pub port: Option<u16>,
    /// Secret holding the SSH credentials, in "namespace/name" form
    pub credential_secret: String,
    #[serde(default)]
    pub auth_type: ScpAuthType,
    #[serde(default)]
    pub files: Vec<ScpFile>,
}

/// How the Scp action authenticates against the remote host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScpAuthType {
    /// `username` and `password` keys
    #[default]
    Password,
    /// `username`, `key` and optional `passphrase` keys
    Key,
}

/// A single file copied by the Scp action
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScpFile {
    /// Exported filename, e.g. "tls.crt"
    pub name: String,
    /// Remote directory; the file keeps its exported name
    pub remote_path: String,
    /// Octal file mode (defaults to "0600")
    #[serde(default)]
    pub mode: Option<String>,
}

/// Submits a batch Job with the exported files mounted
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobAction {
    #[serde(default)]
    pub enabled: bool,
    /// Base name of the submitted Job; a random suffix is appended
    pub name: String,
    /// Volume name used for the exported files (defaults to "certs")
    #[serde(default)]
    pub volume_name: Option<String>,
    /// Mount path of the exported files in every container (defaults to "/workspace")
    #[serde(default)]
    pub mount_path: Option<String>,
    /// batch/v1 JobSpec template
    #[schemars(schema_with = "job_spec_schema")]
    pub spec: serde_json::Value,
}

fn job_spec_schema(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "description": "batch/v1 JobSpec template. Validated by the API server when the Job is submitted.",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Discriminant of an action, in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Echo,
    Email,
    Scp,
    Job,
}

impl ActionKind {
    pub const DISPATCH_ORDER: [ActionKind; 4] = [Self::Echo, Self::Email, Self::Scp, Self::Job];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Email => "email",
            Self::Scp => "scp",
            Self::Job => "job",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An enabled action borrowed from a CertWatcher spec
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    Echo(&'a EchoAction),
    Email(&'a EmailAction),
    Scp(&'a ScpAction),
    Job(&'a JobAction),
}

impl Action<'_> {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Echo(_) => ActionKind::Echo,
            Self::Email(_) => ActionKind::Email,
            Self::Scp(_) => ActionKind::Scp,
            Self::Job(_) => ActionKind::Job,
        }
    }
}

impl Actions {
    /// The action of the given kind, if configured and enabled
    #[must_use]
    pub fn get(&self, kind: ActionKind) -> Option<Action<'_>> {
        match kind {
            ActionKind::Echo => self.echo.as_ref().filter(|a| a.enabled).map(Action::Echo),
            ActionKind::Email => self.email.as_ref().filter(|a| a.enabled).map(Action::Email),
            ActionKind::Scp => self.scp.as_ref().filter(|a| a.enabled).map(Action::Scp),
            ActionKind::Job => self.job.as_ref().filter(|a| a.enabled).map(Action::Job),
        }
    }

    /// Enabled actions in dispatch order
    #[must_use]
    pub fn enabled(&self) -> Vec<Action<'_>> {
        ActionKind::DISPATCH_ORDER
            .iter()
            .filter_map(|kind| self.get(*kind))
            .collect()
    }
}

impl ScpAction {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SCP_PORT)
    }
}

impl ScpFile {
    /// Remote destination path: `remote_path/name`, or just `name` (relative
    /// to the login directory) when no remote path is set
    #[must_use]
    pub fn destination(&self) -> String {
        if self.remote_path.is_empty() {
            return self.name.clone();
        }
        format!("{}/{}", self.remote_path.trim_end_matches('/'), self.name)
    }

    /// File mode bits parsed from the octal string
    pub fn mode_bits(&self) -> Result<i32> {
        let raw = self
            .mode
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_SCP_FILE_MODE);
        let invalid = || {
            CertWatchError::Config(format!(
                "invalid mode {raw:?} for scp file {}: expected an octal value such as 0644",
                self.name
            ))
        };
        let digits = raw.strip_prefix("0o").unwrap_or(raw);
        // from_str_radix alone would accept a leading sign
        if digits.is_empty() || !digits.bytes().all(|b| matches!(b, b'0'..=b'7')) {
            return Err(invalid());
        }
        i32::from_str_radix(digits, 8).map_err(|_overflow| invalid())
    }
}
