//! # Checksum
//!
//! Fingerprint of a Secret used for dirty tracking.
//!
//! The fingerprint covers the data map and the labels, so relabelling a
//! Secret is enough to re-trigger the actions of its CertWatchers even when
//! the certificate itself did not change.
//!
//! Format: SHA-256 over the JSON encoding of `data` (keys sorted, values
//! base64) immediately followed by the JSON encoding of `metadata.labels`
//! (`null` when absent), rendered as URL-safe base64 with padding.

use crate::error::Result;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Fingerprint of a data map and label map
pub fn fingerprint(
    data: Option<&BTreeMap<String, ByteString>>,
    labels: Option<&BTreeMap<String, String>>,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&data)?);
    hasher.update(serde_json::to_vec(&labels)?);
    Ok(URL_SAFE.encode(hasher.finalize()))
}

/// Fingerprint of a Secret's data and labels
pub fn secret_fingerprint(secret: &Secret) -> Result<String> {
    fingerprint(secret.data.as_ref(), secret.metadata.labels.as_ref())
}
