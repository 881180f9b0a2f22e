//! # Scp Action
//!
//! Copies exported files to a remote host over SSH. Each file gets its own
//! connection. Host keys are not verified.

use crate::crd::ScpAuthType;
use crate::error::{CertWatchError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use ssh2::Session;
use std::fmt;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Clone)]
pub enum ScpAuth {
    Password(Zeroizing<String>),
    Key {
        private_key: Zeroizing<String>,
        passphrase: Option<Zeroizing<String>>,
    },
}

impl fmt::Debug for ScpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Password(_) => "password",
            Self::Key { .. } => "key",
        })
    }
}

/// Credentials read from the Secret named by `credentialSecret`
#[derive(Debug, Clone)]
pub struct ScpCredentials {
    pub username: String,
    pub auth: ScpAuth,
}

impl ScpCredentials {
    /// Read `username` plus `password`, or `key` and optional `passphrase`
    pub fn from_secret(secret: &Secret, auth_type: ScpAuthType) -> Result<Self> {
        let name = format!(
            "{}/{}",
            secret.metadata.namespace.as_deref().unwrap_or("default"),
            secret.metadata.name.as_deref().unwrap_or("unknown")
        );
        let value = |field: &str| -> Option<Zeroizing<String>> {
            secret
                .data
                .as_ref()
                .and_then(|data| data.get(field))
                .map(|v| Zeroizing::new(String::from_utf8_lossy(&v.0).into_owned()))
        };
        let required = |field: &str| {
            value(field).ok_or_else(|| {
                CertWatchError::Auth(format!("missing credential value from {name}: {field}"))
            })
        };

        let username = required("username")?.to_string();
        let auth = match auth_type {
            ScpAuthType::Password => ScpAuth::Password(required("password")?),
            ScpAuthType::Key => ScpAuth::Key {
                private_key: required("key")?,
                passphrase: value("passphrase").filter(|p| !p.is_empty()),
            },
        };
        Ok(Self { username, auth })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub hostname: String,
    pub port: u16,
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// Copies a single local file to a remote path
#[async_trait]
pub trait RemoteCopy: Send + Sync {
    async fn copy_file(
        &self,
        target: &RemoteTarget,
        credentials: &ScpCredentials,
        local: &Path,
        remote: &str,
        mode: i32,
    ) -> Result<()>;
}

/// [`RemoteCopy`] over libssh2. The blocking session runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct Ssh2Copy {
    timeout: Duration,
}

impl Ssh2Copy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RemoteCopy for Ssh2Copy {
    async fn copy_file(
        &self,
        target: &RemoteTarget,
        credentials: &ScpCredentials,
        local: &Path,
        remote: &str,
        mode: i32,
    ) -> Result<()> {
        let target = target.clone();
        let credentials = credentials.clone();
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_string();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            copy_blocking(&target, &credentials, &local, &remote, mode, timeout)
        })
        .await
        .map_err(|e| CertWatchError::Delivery(format!("scp task failed: {e}")))?
    }
}

fn copy_blocking(
    target: &RemoteTarget,
    credentials: &ScpCredentials,
    local: &Path,
    remote: &str,
    mode: i32,
    timeout: Duration,
) -> Result<()> {
    let connect_err = |e: &dyn fmt::Display| {
        CertWatchError::Delivery(format!("error connecting to ssh remote host {target} - {e}"))
    };

    let addr = (target.hostname.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| connect_err(&e))?
        .next()
        .ok_or_else(|| connect_err(&"no address resolved"))?;
    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| connect_err(&e))?;

    let mut session = Session::new().map_err(|e| connect_err(&e))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| connect_err(&e))?;

    let auth_result = match &credentials.auth {
        ScpAuth::Password(password) => session.userauth_password(&credentials.username, password),
        ScpAuth::Key {
            private_key,
            passphrase,
        } => session.userauth_pubkey_memory(
            &credentials.username,
            None,
            private_key,
            passphrase.as_ref().map(|p| p.as_str()),
        ),
    };
    auth_result.map_err(|e| {
        CertWatchError::Auth(format!("{target} rejected {}: {e}", credentials.username))
    })?;
    if !session.authenticated() {
        return Err(CertWatchError::Auth(format!(
            "{target} did not authenticate {}",
            credentials.username
        )));
    }

    let contents = std::fs::read(local).map_err(|e| {
        let name = local.file_name().unwrap_or(local.as_os_str());
        CertWatchError::Delivery(format!(
            "error opening certificate file {}: {e}",
            name.to_string_lossy()
        ))
    })?;
    let copy_err = |e: &dyn fmt::Display| {
        CertWatchError::Delivery(format!("error copying certificate file to {target}:{remote}: {e}"))
    };

    let mut channel = session
        .scp_send(Path::new(remote), mode, contents.len() as u64, None)
        .map_err(|e| copy_err(&e))?;
    channel.write_all(&contents).map_err(|e| copy_err(&e))?;
    channel.send_eof().map_err(|e| copy_err(&e))?;
    channel.wait_eof().map_err(|e| copy_err(&e))?;
    channel.close().map_err(|e| copy_err(&e))?;
    channel.wait_close().map_err(|e| copy_err(&e))?;
    Ok(())
}
