//! # Certificate Export
//!
//! Turns the `tls.key`/`tls.crt` payload of a Secret into the fixed set of
//! files consumed by the actions. With the default prefix:
//!
//! | File              | Contents                                  |
//! |-------------------|-------------------------------------------|
//! | `tls.key`         | private key, verbatim                     |
//! | `tls.crt`         | certificate, verbatim                     |
//! | `tls.p12`         | PKCS#12 with key and certificate          |
//! | `tls.crt.p12`     | PKCS#12 with the certificate only         |
//! | `tls.key.zip`     | `tls.key`                                 |
//! | `tls.crt.zip`     | `tls.crt`                                 |
//! | `tls.zip`         | `tls.key`, `tls.crt`                      |
//! | `tls.p12.zip`     | `tls.p12`                                 |
//! | `tls.crt.p12.zip` | `tls.crt.p12`                             |
//! | `tls.all.zip`     | `tls.key`, `tls.crt`, `tls.p12`, `tls.crt.p12` |
//!
//! Steps run strictly in order. The files live in a private [`Workspace`] that
//! is removed when dropped; on failure the partially built workspace is handed
//! back inside [`ExportFailure`] so the caller decides when it goes away.

mod tools;

pub use tools::{CertificateTools, CommandTools};

use crate::constants::{TLS_CRT, TLS_KEY};
use crate::crd::CertWatcherSpec;
use crate::error::{CertWatchError, Result};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};

/// Export options taken from a CertWatcher spec
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions<'a> {
    pub prefix: &'a str,
    pub archive_password: Option<&'a str>,
    pub container_password: Option<&'a str>,
}

impl<'a> From<&'a CertWatcherSpec> for ExportOptions<'a> {
    fn from(spec: &'a CertWatcherSpec) -> Self {
        Self {
            prefix: spec.filenames_prefix(),
            archive_password: spec.archive_password(),
            container_password: spec.container_password(),
        }
    }
}

/// Names of the exported files for a given prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    prefix: String,
}

impl ArtifactNames {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}.key", self.prefix)
    }

    pub fn crt(&self) -> String {
        format!("{}.crt", self.prefix)
    }

    pub fn p12(&self) -> String {
        format!("{}.p12", self.prefix)
    }

    pub fn crt_p12(&self) -> String {
        format!("{}.crt.p12", self.prefix)
    }

    /// Archives in creation order, each with its members
    pub fn archives(&self) -> Vec<(String, Vec<String>)> {
        let p = &self.prefix;
        vec![
            (format!("{p}.key.zip"), vec![self.key()]),
            (format!("{p}.crt.zip"), vec![self.crt()]),
            (format!("{p}.zip"), vec![self.key(), self.crt()]),
            (format!("{p}.p12.zip"), vec![self.p12()]),
            (format!("{p}.crt.p12.zip"), vec![self.crt_p12()]),
            (
                format!("{p}.all.zip"),
                vec![self.key(), self.crt(), self.p12(), self.crt_p12()],
            ),
        ]
    }

    /// Every exported file name
    pub fn all(&self) -> Vec<String> {
        let mut names = vec![self.key(), self.crt(), self.p12(), self.crt_p12()];
        names.extend(self.archives().into_iter().map(|(archive, _)| archive));
        names
    }
}

/// Private temporary directory holding the exported files of one cycle.
/// Removed on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    names: ArtifactNames,
}

impl Workspace {
    fn create(root: Option<&Path>, prefix: &str) -> Result<Self> {
        if prefix.contains(['/', '\\']) || prefix == ".." {
            return Err(CertWatchError::Config(format!(
                "filenamesPrefix {prefix} must be a plain file name"
            )));
        }
        let mut builder = tempfile::Builder::new();
        builder.prefix("certwatch");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| CertWatchError::Export(format!("cannot create temporary directory: {e}")))?;

        Ok(Self {
            dir,
            names: ArtifactNames::new(prefix),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn names(&self) -> &ArtifactNames {
        &self.names
    }

    /// Path of an exported file inside the workspace
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Resolve a user-supplied file name. Only names produced by the export
    /// pipeline that exist on disk resolve; anything else, including absolute
    /// paths and `..` components, is `None`.
    pub fn exported(&self, name: &str) -> Option<PathBuf> {
        if !self.names.all().iter().any(|exported| exported == name) {
            return None;
        }
        let path = self.file(name);
        path.is_file().then_some(path)
    }

    /// Remove the workspace, reporting removal errors that drop would swallow
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().display().to_string();
        self.dir
            .close()
            .map_err(|e| CertWatchError::Export(format!("cannot remove workspace {path}: {e}")))
    }
}

/// An export that failed part way. The workspace, when one was created, is
/// kept so the caller can clean it up.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExportFailure {
    pub workspace: Option<Workspace>,
    pub error: CertWatchError,
}

impl ExportFailure {
    /// Drop the workspace and keep the error
    pub fn into_error(self) -> CertWatchError {
        if let Some(workspace) = self.workspace {
            if let Err(e) = workspace.close() {
                tracing::warn!("{}", e);
            }
        }
        self.error
    }
}

/// Runs the export pipeline
#[derive(Clone)]
pub struct CertificateExporter {
    tools: Arc<dyn CertificateTools>,
    temp_root: Option<PathBuf>,
}

impl std::fmt::Debug for CertificateExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateExporter")
            .field("temp_root", &self.temp_root)
            .finish_non_exhaustive()
    }
}

impl CertificateExporter {
    pub fn new(tools: Arc<dyn CertificateTools>) -> Self {
        Self {
            tools,
            temp_root: None,
        }
    }

    /// Create workspaces under `root` instead of the system temp directory
    #[must_use]
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub async fn export(
        &self,
        secret: &Secret,
        options: ExportOptions<'_>,
    ) -> std::result::Result<Workspace, ExportFailure> {
        let secret_name = format!(
            "{}/{}",
            secret.metadata.namespace.as_deref().unwrap_or("default"),
            secret.metadata.name.as_deref().unwrap_or("unknown")
        );
        let span = info_span!("export", secret = %secret_name, prefix = options.prefix);
        let start = Instant::now();

        let workspace = Workspace::create(self.temp_root.as_deref(), options.prefix)
            .map_err(|error| ExportFailure {
                workspace: None,
                error,
            })?;

        let result = self
            .populate(&workspace, secret, &secret_name, options)
            .instrument(span)
            .await;
        metrics::observe_export_duration(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => Ok(workspace),
            Err(error) => {
                metrics::increment_export_failures();
                Err(ExportFailure {
                    workspace: Some(workspace),
                    error,
                })
            }
        }
    }

    async fn populate(
        &self,
        workspace: &Workspace,
        secret: &Secret,
        secret_name: &str,
        options: ExportOptions<'_>,
    ) -> Result<()> {
        let payload = |field: &str| {
            secret
                .data
                .as_ref()
                .and_then(|data| data.get(field))
                .map(|value| value.0.as_slice())
                .ok_or_else(|| CertWatchError::MissingField {
                    secret: secret_name.to_string(),
                    field: field.to_string(),
                })
        };
        let key = payload(TLS_KEY)?;
        let crt = payload(TLS_CRT)?;

        let names = workspace.names();
        let key_path = workspace.file(&names.key());
        let crt_path = workspace.file(&names.crt());
        write_private_file(&key_path, key).await?;
        write_private_file(&crt_path, crt).await?;

        self.tools
            .pkcs12(
                &workspace.file(&names.p12()),
                &crt_path,
                Some(&key_path),
                options.container_password,
            )
            .await?;
        self.tools
            .pkcs12(
                &workspace.file(&names.crt_p12()),
                &crt_path,
                None,
                options.container_password,
            )
            .await?;

        for (archive, members) in names.archives() {
            self.tools
                .zip(workspace.path(), &archive, options.archive_password, &members)
                .await?;
        }

        debug!(workspace = %workspace.path().display(), "export complete");
        Ok(())
    }
}

/// Write `contents` to a new file readable only by the owner
async fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    // file name only; the workspace path changes on every cycle
    let label = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let io_err = |e: std::io::Error| CertWatchError::Export(format!("cannot write {label}: {e}"));

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(io_err)?;
    file.write_all(contents).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    Ok(())
}
