//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_opt, env_var_or_default, env_var_or_default_str};
use crate::constants::*;
use std::path::PathBuf;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Delay before retrying a failed reconcile, used for the first
    /// `retry_max_fast_attempts` failures (seconds)
    pub retry_fast_delay_secs: u64,
    /// Delay used once the fast attempts are exhausted (seconds)
    pub retry_slow_delay_secs: u64,
    /// Number of consecutive failures retried with the fast delay
    pub retry_max_fast_attempts: u32,
    /// Requeue interval for a Secret whose dependents were not all Ready (seconds)
    pub deferral_requeue_secs: u64,
    /// Upper bound for a single reconcile cycle (seconds)
    pub reconcile_timeout_secs: u64,
    /// Connect and I/O timeout for SMTP and SSH sessions (seconds)
    pub action_timeout_secs: u64,
    /// Default SMTP server properties file for the Email action
    pub email_config_file: Option<PathBuf>,
    /// openssl binary used to build PKCS#12 envelopes
    pub openssl_bin: String,
    /// zip binary used to build the archives
    pub zip_bin: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Pod name, used as the event reporter instance
    pub pod_name: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry_fast_delay_secs: DEFAULT_RETRY_FAST_DELAY_SECS,
            retry_slow_delay_secs: DEFAULT_RETRY_SLOW_DELAY_SECS,
            retry_max_fast_attempts: DEFAULT_RETRY_MAX_FAST_ATTEMPTS,
            deferral_requeue_secs: DEFAULT_DEFERRAL_REQUEUE_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            action_timeout_secs: DEFAULT_ACTION_TIMEOUT_SECS,
            email_config_file: None,
            openssl_bin: "openssl".to_string(),
            zip_bin: "zip".to_string(),
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            pod_name: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            retry_fast_delay_secs: env_var_or_default(
                "RETRY_FAST_DELAY_SECS",
                DEFAULT_RETRY_FAST_DELAY_SECS,
            ),
            retry_slow_delay_secs: env_var_or_default(
                "RETRY_SLOW_DELAY_SECS",
                DEFAULT_RETRY_SLOW_DELAY_SECS,
            ),
            retry_max_fast_attempts: env_var_or_default(
                "RETRY_MAX_FAST_ATTEMPTS",
                DEFAULT_RETRY_MAX_FAST_ATTEMPTS,
            ),
            deferral_requeue_secs: env_var_or_default(
                "DEFERRAL_REQUEUE_SECS",
                DEFAULT_DEFERRAL_REQUEUE_SECS,
            ),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            action_timeout_secs: env_var_or_default(
                "ACTION_TIMEOUT_SECS",
                DEFAULT_ACTION_TIMEOUT_SECS,
            ),
            email_config_file: env_var_opt("EMAIL_CONFIG_FILE").map(PathBuf::from),
            openssl_bin: env_var_or_default_str("OPENSSL_BIN", "openssl"),
            zip_bin: env_var_or_default_str("ZIP_BIN", "zip"),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            pod_name: env_var_opt("POD_NAME"),
        }
    }

    pub fn retry_fast_delay(&self) -> Duration {
        Duration::from_secs(self.retry_fast_delay_secs)
    }

    pub fn retry_slow_delay(&self) -> Duration {
        Duration::from_secs(self.retry_slow_delay_secs)
    }

    pub fn deferral_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.deferral_requeue_secs)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    /// Whether logs should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        !self.log_format.eq_ignore_ascii_case("text")
    }
}
