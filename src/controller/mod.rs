//! # Controllers
//!
//! Two controllers share one [`Context`]:
//!
//! - `secret_watch.rs` - change detection on TLS Secrets
//! - `lifecycle.rs` - the CertWatcher state machine
//! - `backoff.rs` - retry delays used by the error policy
//! - `server.rs` - metrics and probe endpoints

pub mod backoff;
pub mod context;
pub mod lifecycle;
pub mod secret_watch;
pub mod server;

pub use context::Context;
pub use lifecycle::reconcile_watcher;
pub use secret_watch::{detect_changes, reconcile_secret, DetectionReport};
