//! # CertWatcher Spec
//!
//! Main CRD specification: which Secret to watch, how exported files are named
//! and protected, and which actions run when the Secret changes.

use crate::constants::DEFAULT_FILENAMES_PREFIX;
use crate::crd::{Actions, CertWatcherStatus, LifecyclePhase};
use crate::store::ObjectKey;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CertWatcher Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: certwatch.morimoto.net.br/v1
/// kind: CertWatcher
/// metadata:
///   name: web-cert
///   namespace: default
/// spec:
///   secret:
///     namespace: default
///     name: web-tls
///   filenamesPrefix: web
///   zipFilesPassword: changeit
///   actions:
///     echo:
///       enabled: true
///     email:
///       enabled: true
///       to: ops@example.com,security@example.com
///       subject: New certificate for web
///       attachments: ["web.all.zip"]
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CertWatcher",
    group = "certwatch.morimoto.net.br",
    version = "v1",
    namespaced,
    status = "CertWatcherStatus",
    shortname = "cw",
    printcolumn = r#"{"name":"SECRET_NS", "type":"string", "jsonPath":".spec.secret.namespace"}"#,
    printcolumn = r#"{"name":"SECRET_NAME", "type":"string", "jsonPath":".spec.secret.name"}"#,
    printcolumn = r#"{"name":"PHASE", "type":"string", "jsonPath":".status.lifecyclePhase"}"#,
    printcolumn = r#"{"name":"LAST_UPDATE", "type":"string", "jsonPath":".status.lastUpdate"}"#,
    printcolumn = r#"{"name":"LAST_CHECKSUM", "type":"string", "jsonPath":".status.lastChecksum"}"#,
    printcolumn = r#"{"name":"MESSAGE", "type":"string", "jsonPath":".status.message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CertWatcherSpec {
    /// Secret watched by this CertWatcher. Used as an index key, so it should
    /// not change after creation.
    pub secret: SecretRef,
    /// Password used to protect exported zip files. Empty or absent means the
    /// archives are not password protected.
    #[serde(default)]
    pub zip_files_password: Option<String>,
    /// Password used for the PKCS#12 envelopes. Empty or absent means no
    /// password.
    #[serde(default)]
    pub pkcs12_password: Option<String>,
    /// Filename prefix for exported files. Defaults to "tls", producing
    /// tls.key, tls.crt, tls.p12, ...
    #[serde(default)]
    pub filenames_prefix: Option<String>,
    /// Actions performed when the watched Secret changes
    #[serde(default)]
    pub actions: Actions,
}

/// Reference to the watched Secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Namespace of the Secret
    pub namespace: String,
    /// Name of the Secret
    pub name: String,
}

impl SecretRef {
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

impl CertWatcherSpec {
    /// Prefix for exported filenames, falling back to "tls"
    #[must_use]
    pub fn filenames_prefix(&self) -> &str {
        non_empty(self.filenames_prefix.as_deref()).unwrap_or(DEFAULT_FILENAMES_PREFIX)
    }

    #[must_use]
    pub fn archive_password(&self) -> Option<&str> {
        non_empty(self.zip_files_password.as_deref())
    }

    #[must_use]
    pub fn container_password(&self) -> Option<&str> {
        non_empty(self.pkcs12_password.as_deref())
    }
}

impl CertWatcher {
    /// Identity of this CertWatcher
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or("unknown"),
        )
    }

    /// Current lifecycle phase; a missing status means Uninitialized
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.status
            .as_ref()
            .map(|s| s.lifecycle_phase)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn last_checksum(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.last_checksum.as_deref())
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.message.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
