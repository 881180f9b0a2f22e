//! # Custom Resource Definitions
//!
//! CRD types for the Cert Watch controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `CertWatcher` specification, secret reference and export options
//! - `actions.rs` - Action variants (Echo, Email, Scp, Job) and their dispatch order
//! - `status.rs` - Lifecycle phase and status fields

mod actions;
mod spec;
mod status;

pub use actions::{
    Action, ActionKind, Actions, EchoAction, EmailAction, JobAction, ScpAction, ScpAuthType,
    ScpFile,
};
pub use spec::{CertWatcher, CertWatcherSpec, SecretRef};
pub use status::{CertWatcherStatus, LifecyclePhase};
