//! Built-in defaults applied when no layer overrides a setting.

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Address the forwarded local service binds to.
pub const DEFAULT_LOCAL_BIND_ADDRESS: &str = "127.0.0.1";

/// Port the forwarded local service listens on.
pub const DEFAULT_LOCAL_PORT: u16 = 5000;

/// Port advertised on the published address.
pub const DEFAULT_VIRTUAL_PORT: u16 = 12345;

/// Host running the control daemon.
pub const DEFAULT_CONTROL_HOST: &str = "127.0.0.1";

/// Control port of the daemon.
pub const DEFAULT_CONTROL_PORT: u16 = 9051;

/// Cookie file written by a stock Debian/Ubuntu daemon.
pub const DEFAULT_COOKIE_PATH: &str = "/run/tor/control.authcookie";

/// Upper bound on the wait for daemon bootstrap, in milliseconds.
pub const DEFAULT_BOOTSTRAP_TIMEOUT_MS: u64 = 15_000;

/// Daemon executable resolved through `PATH` by the provisioner.
pub const DEFAULT_TOR_BINARY: &str = "tor";

/// Wait for the cookie file to appear after spawning, in milliseconds.
pub const DEFAULT_COOKIE_TIMEOUT_MS: u64 = 15_000;

/// Wait for the control port to accept connections, in milliseconds.
pub const DEFAULT_CONTROL_TIMEOUT_MS: u64 = 8_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned bind address used where allocation is required (e.g. serde).
pub fn default_local_bind_address() -> String {
    DEFAULT_LOCAL_BIND_ADDRESS.to_owned()
}

/// Owned control host used where allocation is required.
pub fn default_control_host() -> String {
    DEFAULT_CONTROL_HOST.to_owned()
}

/// Default cookie path.
pub fn default_cookie_path() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_COOKIE_PATH)
}

/// Default daemon executable name.
pub fn default_tor_binary() -> String {
    DEFAULT_TOR_BINARY.to_owned()
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
