//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use cert_watch::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::actions::{ActionBackends, ActionDispatcher, JobSubmitter, MailTransport, RemoteCopy};
pub use crate::config::{ControllerConfig, EmailServerConfig, ServerConfig};
pub use crate::controller::{Context, DetectionReport};
pub use crate::error::{CertWatchError, Result};
pub use crate::export::{CertificateExporter, CertificateTools, ExportOptions, Workspace};
pub use crate::store::{EventKind, EventPublisher, ObjectKey, ResourceStore};
