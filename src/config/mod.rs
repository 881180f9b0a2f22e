//! # Configuration
//!
//! Controller configuration loaded once from environment variables at startup
//! and passed into the components that need it.
//!
//! - `controller.rs` - retry policy, deadlines, tool locations and logging
//! - `server.rs` - probe/metrics HTTP server settings
//! - `email.rs` - SMTP server properties file used by the Email action

mod controller;
mod email;
mod server;

pub use controller::ControllerConfig;
pub use email::{EmailServerConfig, SmtpEncryption};
pub use server::ServerConfig;

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an optional, non-empty environment variable
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
