//! Error types for daemon provisioning.

use std::ffi::OsString;
use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while preparing and starting the control daemon.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cookie path {path} has no parent directory; set --data-dir explicitly")]
    MissingDataDir { path: Utf8PathBuf },
    #[error("failed to create data directory {path}: {source}")]
    CreateDataDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read daemon configuration {path}: {source}")]
    ReadTorrc {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write daemon configuration {path}: {source}")]
    WriteTorrc {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("daemon binary '{binary}' was not found; install it or set --tor-binary")]
    BinaryNotFound { binary: String },
    #[error("failed to spawn daemon binary '{binary:?}': {source}")]
    Launch {
        binary: OsString,
        #[source]
        source: io::Error,
    },
    #[error("failed to monitor daemon launch: {source}")]
    MonitorChild {
        #[source]
        source: io::Error,
    },
    #[error("daemon exited before becoming ready (status: {exit_status:?})")]
    DaemonExited { exit_status: Option<i32> },
    #[error("failed to read cookie {path}: {source}")]
    ReadCookie {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("timed out after {timeout_ms} ms waiting for cookie {path}")]
    CookieTimeout { path: Utf8PathBuf, timeout_ms: u128 },
    #[error("failed to probe control port {endpoint}: {source}")]
    ProbeControlPort {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out after {timeout_ms} ms waiting for control port {endpoint}")]
    ControlPortTimeout { endpoint: String, timeout_ms: u128 },
}
