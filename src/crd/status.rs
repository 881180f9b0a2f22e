//! # Status
//!
//! Status fields of a CertWatcher, written only by the controllers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a CertWatcher
///
/// ```text
/// Uninitialized --initialize--> Ready --secret changed--> ActionPending
///                                 ^                            |
///                                 +------ actions succeeded ---+
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum LifecyclePhase {
    /// No baseline checksum recorded yet
    #[default]
    Uninitialized,
    /// Baseline recorded, waiting for the next Secret change
    Ready,
    /// The Secret changed; the export and actions are due
    ActionPending,
}

impl LifecyclePhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Ready => "Ready",
            Self::ActionPending => "ActionPending",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertWatcherStatus {
    #[serde(default)]
    pub lifecycle_phase: LifecyclePhase,
    /// Fingerprint of the Secret at the last successful initialization or change detection
    #[serde(default)]
    pub last_checksum: Option<String>,
    /// RFC 3339 timestamp of the last status write
    #[serde(default)]
    pub last_update: Option<String>,
    /// Human readable outcome of the last cycle
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let status = CertWatcherStatus {
            lifecycle_phase: LifecyclePhase::ActionPending,
            last_checksum: Some("abc=".to_string()),
            last_update: None,
            message: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["lifecyclePhase"], "ActionPending");
        assert_eq!(json["lastChecksum"], "abc=");
    }

    #[test]
    fn test_empty_status_defaults_to_uninitialized() {
        let status: CertWatcherStatus = serde_json::from_str("{}").unwrap();
        assert_eq!(status.lifecycle_phase, LifecyclePhase::Uninitialized);
    }
}
