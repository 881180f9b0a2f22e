//! Cert Watch Controller Library
//!
//! This library provides the core functionality for the Cert Watch controller:
//! it watches `kubernetes.io/tls` Secrets and drives dependent `CertWatcher`
//! resources through their notification lifecycle.
//!
//! ## Quick Start
//!
//! ```rust
//! use cert_watch::prelude::*;
//! ```
//!
//! ## Module Structure
//!
//! - `checksum` - Secret fingerprinting used for dirty tracking
//! - `export` - Certificate export pipeline (raw, PKCS#12 and zip artifacts)
//! - `actions` - Action dispatcher and the Echo/Email/Scp/Job actions
//! - `controller` - Change-detection and lifecycle controllers
//! - `store` - Resource store and event seams consumed by the controllers
//! - `runtime` - Process bootstrap, watch loop and error policy

pub mod actions;
pub mod checksum;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod export;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
