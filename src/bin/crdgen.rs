//! # CRD Generator
//!
//! Prints the `CertWatcher` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/certwatcher.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use cert_watch::crd::CertWatcher;
use kube::core::CustomResourceExt;

fn main() {
    let crd = CertWatcher::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
