//! # Email Server Configuration
//!
//! SMTP server settings for the Email action, read from a Java-style
//! properties file (`key=value`, `key: value` and `key value` lines):
//!
//! ```text
//! host=smtp.example.com
//! port=587
//! username=certwatch
//! password=secret
//! encryption=STARTTLS
//! from=certwatch@example.com
//! ```
//!
//! `host` and `port` are required. `encryption` accepts SSL and SSLTLS
//! (implicit TLS) and TLS and STARTTLS (upgrade after connect); any other
//! value means a plain connection.
//!
//! `${name}` in a value is replaced by the property `name`, or by the
//! environment variable `name` when no such property exists. A `$` not
//! followed by `{` is kept as is.

use crate::error::{CertWatchError, Result};
use encoding_rs::UTF_8;
use java_properties::{PropertiesError, PropertiesIter};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Nesting limit for `${name}` references
const MAX_EXPANSION_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmtpEncryption {
    #[default]
    None,
    Ssl,
    Tls,
    SslTls,
    StartTls,
}

impl SmtpEncryption {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "SSL" => Self::Ssl,
            "TLS" => Self::Tls,
            "SSLTLS" => Self::SslTls,
            "STARTTLS" => Self::StartTls,
            _ => Self::None,
        }
    }

    /// Whether the connection is wrapped in TLS from the first byte
    #[must_use]
    pub fn is_implicit_tls(self) -> bool {
        matches!(self, Self::Ssl | Self::SslTls)
    }

    /// Whether a plain connection is upgraded with STARTTLS
    #[must_use]
    pub fn is_starttls(self) -> bool {
        matches!(self, Self::Tls | Self::StartTls)
    }
}

#[derive(Clone)]
pub struct EmailServerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub encryption: SmtpEncryption,
    /// Default sender, used when the action does not set one
    pub from: Option<String>,
}

impl fmt::Debug for EmailServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("encryption", &self.encryption)
            .field("from", &self.from)
            .finish()
    }
}

impl EmailServerConfig {
    /// Load and parse a properties file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            CertWatchError::Config(format!(
                "unable to read email configuration {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&contents).map_err(|e| match e {
            CertWatchError::Config(msg) => {
                CertWatchError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parse properties from an in-memory buffer
    pub fn parse(contents: &str) -> Result<Self> {
        let mut raw = HashMap::new();
        PropertiesIter::new_with_encoding(contents.as_bytes(), UTF_8)
            .read_into(|key, value| {
                raw.insert(key, value);
            })
            .map_err(|e: PropertiesError| {
                CertWatchError::Config(format!("invalid email configuration: {e}"))
            })?;
        let mut props = raw
            .iter()
            .map(|(key, value)| Ok((key.clone(), expand(&raw, value, 0)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        let host = props
            .remove("host")
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| CertWatchError::Config("email configuration is missing host".into()))?;
        let port = props
            .remove("port")
            .ok_or_else(|| CertWatchError::Config("email configuration is missing port".into()))?;
        let port = port.trim().parse::<u16>().map_err(|_invalid| {
            CertWatchError::Config(format!("email configuration has invalid port {port:?}"))
        })?;

        Ok(Self {
            host,
            port,
            username: props.remove("username").filter(|v| !v.is_empty()),
            password: props
                .remove("password")
                .filter(|v| !v.is_empty())
                .map(Zeroizing::new),
            encryption: props
                .get("encryption")
                .map(|v| SmtpEncryption::parse(v))
                .unwrap_or_default(),
            from: props.remove("from").filter(|v| !v.is_empty()),
        })
    }
}

/// Resolve `${name}` references against the other properties, then the
/// environment
fn expand(props: &HashMap<String, String>, value: &str, depth: usize) -> Result<String> {
    if depth > MAX_EXPANSION_DEPTH {
        return Err(CertWatchError::Config(format!(
            "circular property reference in {value:?}"
        )));
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            CertWatchError::Config(format!("unterminated property reference in {value:?}"))
        })?;
        let name = &after[..end];
        let resolved = match props.get(name) {
            Some(referenced) => expand(props, referenced, depth + 1)?,
            None => std::env::var(name).map_err(|_unset| {
                CertWatchError::Config(format!("unknown property reference ${{{name}}}"))
            })?,
        };
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_configuration() {
        let config = EmailServerConfig::parse(
            "# smtp relay\nhost=smtp.example.com\nport=587\nusername=certwatch\npassword=s3cret\nencryption=STARTTLS\nfrom=certwatch@example.com\n",
        )
        .unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.username.as_deref(), Some("certwatch"));
        assert_eq!(config.password.as_deref().map(String::as_str), Some("s3cret"));
        assert_eq!(config.encryption, SmtpEncryption::StartTls);
        assert!(config.encryption.is_starttls());
        assert_eq!(config.from.as_deref(), Some("certwatch@example.com"));
    }

    #[test]
    fn test_unknown_encryption_means_none() {
        let config = EmailServerConfig::parse("host=mail\nport=25\nencryption=ROT13\n").unwrap();
        assert_eq!(config.encryption, SmtpEncryption::None);
        assert!(config.username.is_none());
        assert!(config.from.is_none());
    }

    #[test]
    fn test_missing_host_or_port_is_config_error() {
        assert!(matches!(
            EmailServerConfig::parse("port=25\n"),
            Err(CertWatchError::Config(_))
        ));
        assert!(matches!(
            EmailServerConfig::parse("host=mail\n"),
            Err(CertWatchError::Config(_))
        ));
        assert!(matches!(
            EmailServerConfig::parse("host=mail\nport=smtp\n"),
            Err(CertWatchError::Config(_))
        ));
    }

    #[test]
    fn test_dollar_signs_are_literal() {
        let config =
            EmailServerConfig::parse("host=mail\nport=25\npassword=pa$$word\nusername=p$HOME\n")
                .unwrap();
        assert_eq!(config.password.as_deref().map(String::as_str), Some("pa$$word"));
        assert_eq!(config.username.as_deref(), Some("p$HOME"));
    }

    #[test]
    fn test_utf8_values() {
        let config = EmailServerConfig::parse("host=mail\nport=25\npassword=pässwörd€\n").unwrap();
        assert_eq!(config.password.as_deref().map(String::as_str), Some("pässwörd€"));
    }

    #[test]
    fn test_colon_and_space_separators() {
        let config = EmailServerConfig::parse(
            "! relay settings\nhost: smtp.example.com\nport 465\nencryption = SSL\n",
        )
        .unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 465);
        assert!(config.encryption.is_implicit_tls());
    }

    #[test]
    fn test_references_resolve_to_other_properties() {
        let config = EmailServerConfig::parse(
            "domain=example.com\nhost=smtp.${domain}\nport=25\nfrom=certwatch@${domain}\n",
        )
        .unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.from.as_deref(), Some("certwatch@example.com"));
    }

    #[test]
    fn test_bad_references_are_config_errors() {
        for contents in [
            "host=${a}\nport=25\na=${b}\nb=${a}\n",
            "host=${CERTWATCH_TEST_UNSET_VARIABLE}\nport=25\n",
            "host=${oops\nport=25\n",
        ] {
            assert!(
                matches!(EmailServerConfig::parse(contents), Err(CertWatchError::Config(_))),
                "{contents}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = EmailServerConfig::parse("host=mail\nport=25\npassword=hunter2\n").unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_config_error() {
        let err = EmailServerConfig::load(Path::new("/nonexistent/email.properties"))
            .await
            .unwrap_err();
        assert!(matches!(err, CertWatchError::Config(_)));
    }
}
