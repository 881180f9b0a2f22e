//! # External Tools
//!
//! PKCS#12 conversion and zip archiving are delegated to the `openssl` and
//! `zip` binaries. Both run with `kill_on_drop`, so a cancelled export does not
//! leave orphaned processes behind.

use crate::config::ControllerConfig;
use crate::error::{CertWatchError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable used to hand the PKCS#12 password to openssl,
/// keeping it out of the process arguments
const PKCS12_PASSWORD_ENV: &str = "CERTWATCH_PKCS12_PASSWORD";

/// Container-format conversion and archiving used by the export pipeline
#[async_trait]
pub trait CertificateTools: Send + Sync {
    /// Write a PKCS#12 container to `out` holding the certificate at `cert`
    /// and, when given, the private key at `key`
    async fn pkcs12(
        &self,
        out: &Path,
        cert: &Path,
        key: Option<&Path>,
        password: Option<&str>,
    ) -> Result<()>;

    /// Create `archive` inside `dir` from `files` (names relative to `dir`)
    async fn zip(
        &self,
        dir: &Path,
        archive: &str,
        password: Option<&str>,
        files: &[String],
    ) -> Result<()>;
}

/// [`CertificateTools`] backed by the openssl and zip command line tools
#[derive(Debug, Clone)]
pub struct CommandTools {
    openssl: String,
    zip: String,
}

impl CommandTools {
    pub fn new(openssl: impl Into<String>, zip: impl Into<String>) -> Self {
        Self {
            openssl: openssl.into(),
            zip: zip.into(),
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(&config.openssl_bin, &config.zip_bin)
    }

    /// Log where the binaries were found. Missing binaries are not fatal:
    /// export cycles fail and retry until they are installed.
    pub fn check_available(&self) {
        for bin in [&self.openssl, &self.zip] {
            match which::which(bin) {
                Ok(path) => info!("Using {} at {}", bin, path.display()),
                Err(e) => warn!(
                    "{} not found ({}); certificate exports will fail until it is installed",
                    bin, e
                ),
            }
        }
    }
}

#[async_trait]
impl CertificateTools for CommandTools {
    async fn pkcs12(
        &self,
        out: &Path,
        cert: &Path,
        key: Option<&Path>,
        password: Option<&str>,
    ) -> Result<()> {
        let mut cmd = Command::new(&self.openssl);
        cmd.arg("pkcs12").arg("-export");
        if key.is_none() {
            cmd.arg("-nokeys");
        }
        cmd.arg("-out").arg(out).arg("-in").arg(cert);
        if let Some(key) = key {
            cmd.arg("-inkey").arg(key);
        }
        cmd.arg("-passout")
            .arg(format!("env:{PKCS12_PASSWORD_ENV}"))
            .env(PKCS12_PASSWORD_ENV, password.unwrap_or_default());

        run(cmd, &file_label(out), out.parent()).await
    }

    async fn zip(
        &self,
        dir: &Path,
        archive: &str,
        password: Option<&str>,
        files: &[String],
    ) -> Result<()> {
        let mut cmd = Command::new(&self.zip);
        // -j keeps entries flat, -q keeps the output to errors only
        cmd.arg("-q").arg("-j");
        if let Some(password) = password {
            cmd.arg("-P").arg(password);
        }
        cmd.arg(archive).args(files).current_dir(dir);

        run(cmd, archive, Some(dir)).await
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Strip the per-cycle workspace path and openssl's thread id prefix from tool
/// output so repeated failures report the same message
fn scrub(output: &[u8], workdir: Option<&Path>) -> String {
    let text = String::from_utf8_lossy(output);
    let text = text
        .trim()
        .lines()
        .map(|line| match line.split_once(":error:") {
            Some((thread, rest))
                if !thread.is_empty() && thread.chars().all(|c| c.is_ascii_hexdigit()) =>
            {
                format!("error:{rest}")
            }
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n");
    match workdir.map(|dir| dir.display().to_string()) {
        Some(dir) if !dir.is_empty() => text
            .replace(&format!("{dir}/"), "")
            .replace(&dir, "."),
        _ => text,
    }
}

async fn run(mut cmd: Command, artifact: &str, workdir: Option<&Path>) -> Result<()> {
    debug!(artifact, "running {:?}", cmd.as_std().get_program());
    let output = cmd
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CertWatchError::Export(format!("cannot create {artifact}: {e}")))?;

    if output.status.success() {
        return Ok(());
    }

    Err(CertWatchError::Export(format!(
        "cannot create {artifact}: {}\n{}{}",
        output.status,
        scrub(&output.stdout, workdir),
        scrub(&output.stderr, workdir)
    )))
}
