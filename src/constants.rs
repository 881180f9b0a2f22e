//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Retry delay used for the first few failures of a resource (seconds)
pub const DEFAULT_RETRY_FAST_DELAY_SECS: u64 = 5;

/// Retry delay used once the fast attempts are exhausted (seconds)
pub const DEFAULT_RETRY_SLOW_DELAY_SECS: u64 = 30;

/// Number of failures retried with the fast delay
pub const DEFAULT_RETRY_MAX_FAST_ATTEMPTS: u32 = 5;

/// Requeue interval when a dependent CertWatcher is not Ready (seconds)
pub const DEFAULT_DEFERRAL_REQUEUE_SECS: u64 = 5;

/// Upper bound for a single reconcile cycle (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 300;

/// Secret type handled by the change-detection controller
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

/// Secret data key holding the private key
pub const TLS_KEY: &str = "tls.key";

/// Secret data key holding the certificate
pub const TLS_CRT: &str = "tls.crt";

/// Filename prefix used for exported artifacts when none is configured
pub const DEFAULT_FILENAMES_PREFIX: &str = "tls";

/// Connect and I/O timeout for SMTP and SSH sessions (seconds)
pub const DEFAULT_ACTION_TIMEOUT_SECS: u64 = 60;

/// Default SSH port for the Scp action
pub const DEFAULT_SCP_PORT: u16 = 22;

/// Default remote file mode for the Scp action
pub const DEFAULT_SCP_FILE_MODE: &str = "0600";

/// Default volume name injected into Job templates
pub const DEFAULT_JOB_VOLUME_NAME: &str = "certs";

/// Default mount path injected into Job containers
pub const DEFAULT_JOB_MOUNT_PATH: &str = "/workspace";

/// Length of the random hex suffix appended to Job names
pub const JOB_NAME_SUFFIX_LEN: usize = 12;

/// Field manager and event reporter name
pub const CONTROLLER_NAME: &str = "cert-watch";

/// Status message after a successful initialization
pub const MESSAGE_INITIALIZED: &str = "CertWatcher successfully initialized";

/// Status message after a successful action cycle
pub const MESSAGE_WAITING: &str = "Waiting for next Secret change";
