//! # Errors
//!
//! Failure taxonomy shared by the change-detection controller, the lifecycle
//! state machine, the export pipeline and the action dispatcher.
//!
//! Every variant is retryable: the controllers record the message on the
//! CertWatcher status and hand the error to the error policy, which schedules
//! the next attempt with the fast-then-slow backoff.

use std::time::Duration;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = CertWatchError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CertWatchError {
    /// A referenced object does not exist (yet)
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Malformed action or export configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Credentials for a backend are missing or rejected
    #[error("authentication error: {0}")]
    Auth(String),

    /// E-mail or remote copy delivery failed
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Job submission failed
    #[error("submission error: {0}")]
    Submission(String),

    /// Credential lacks a required payload key
    #[error("secret {secret} does not have value for {field}")]
    MissingField { secret: String, field: String },

    /// Secret payload or labels could not be serialized for hashing
    #[error("unable to calculate secret checksum: {0}")]
    Checksum(#[from] serde_json::Error),

    /// Workspace creation, file writing or external tool failure
    #[error("export error: {0}")]
    Export(String),

    /// Conditional status write rejected because the object changed
    #[error("conflict updating {0}: object was modified concurrently")]
    Conflict(String),

    /// Reconcile cycle exceeded its deadline
    #[error("reconcile deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Some dependents of a Secret could not be updated
    #[error("{failed} of {total} dependent CertWatchers could not be updated: {summary}")]
    Dependents {
        failed: usize,
        total: usize,
        summary: String,
    },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl CertWatchError {
    pub fn not_found(kind: &'static str, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Short, stable label for metrics and event reasons
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Config(_) => "config",
            Self::Auth(_) => "auth",
            Self::Delivery(_) => "delivery",
            Self::Submission(_) => "submission",
            Self::MissingField { .. } => "missing_field",
            Self::Checksum(_) => "checksum",
            Self::Export(_) => "export",
            Self::Conflict(_) => "conflict",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::Dependents { .. } => "dependents",
            Self::Kube(_) => "kube",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message_names_secret_and_key() {
        let err = CertWatchError::MissingField {
            secret: "default/web-tls".to_string(),
            field: "tls.crt".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "secret default/web-tls does not have value for tls.crt"
        );
        assert_eq!(err.kind(), "missing_field");
    }

    #[test]
    fn test_not_found_message() {
        let err = CertWatchError::not_found("Secret", "ops", "ssh-creds");
        assert_eq!(err.to_string(), "Secret ops/ssh-creds not found");
    }
}
