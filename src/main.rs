//! # Cert Watch Controller
//!
//! Watches `kubernetes.io/tls` Secrets and runs the actions configured on
//! every `CertWatcher` that references a changed Secret.

use anyhow::Result;
use cert_watch::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init).await
}
