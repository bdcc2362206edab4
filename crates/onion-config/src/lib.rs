//! Shared configuration for the onion service control tools.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then an
//! optional configuration file (`--config-path` / `ONION_CONFIG_PATH`), then
//! `ONION_*` environment variables, then command-line flags. Boolean
//! settings are switched on the command line through [`Config::load_from_args`].
//! The control client consumes a resolved [`Config`] and never performs
//! platform detection itself.

use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod defaults;
mod flags;
mod logging;
mod modes;

pub use defaults::{
    DEFAULT_BOOTSTRAP_TIMEOUT_MS, DEFAULT_CONTROL_HOST, DEFAULT_CONTROL_PORT,
    DEFAULT_CONTROL_TIMEOUT_MS, DEFAULT_COOKIE_PATH, DEFAULT_COOKIE_TIMEOUT_MS,
    DEFAULT_LOCAL_BIND_ADDRESS, DEFAULT_LOCAL_PORT, DEFAULT_LOG_FILTER, DEFAULT_TOR_BINARY,
    DEFAULT_VIRTUAL_PORT, default_control_host, default_cookie_path, default_local_bind_address,
    default_log_filter, default_log_filter_string, default_log_format, default_tor_binary,
};
pub use flags::BOOL_FLAGS;
pub use logging::{LogFormat, LogFormatParseError};
pub use modes::{AuthMode, ModeParseError, PersistenceMode};

/// Resolved settings for the control client, the provisioner and the CLI.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "ONION")]
pub struct Config {
    /// Address the forwarded local service binds to.
    #[ortho_config(default = default_local_bind_address())]
    pub local_bind_address: String,
    /// Port of the forwarded local service.
    #[ortho_config(default = DEFAULT_LOCAL_PORT)]
    pub local_port: u16,
    /// Port exposed on the published address.
    #[ortho_config(default = DEFAULT_VIRTUAL_PORT)]
    pub virtual_port: u16,
    /// Host of the control daemon.
    #[ortho_config(default = default_control_host())]
    pub control_host: String,
    /// Control port of the daemon.
    #[ortho_config(default = DEFAULT_CONTROL_PORT)]
    pub control_port: u16,
    /// Authentication mode used against the control port.
    #[ortho_config(default = AuthMode::Cookie)]
    pub auth_mode: AuthMode,
    /// Cookie file written by the daemon.
    #[ortho_config(default = default_cookie_path())]
    pub cookie_path: Utf8PathBuf,
    /// Whether the daemon or the caller owns the service key.
    #[ortho_config(default = PersistenceMode::Ephemeral)]
    pub persistence: PersistenceMode,
    /// Key material for provided-key persistence.
    pub provided_key: Option<String>,
    /// Upper bound on the bootstrap wait, in milliseconds.
    #[ortho_config(default = DEFAULT_BOOTSTRAP_TIMEOUT_MS)]
    pub bootstrap_timeout_ms: u64,
    /// Whether setup waits for the daemon to finish bootstrapping.
    #[ortho_config(default = true, skip_cli)]
    pub wait_for_bootstrap: bool,
    /// Hides secret-adjacent values such as the cookie path in diagnostics.
    #[ortho_config(default = true, skip_cli)]
    pub redact_secrets: bool,
    /// Skips all daemon I/O and synthesises a deterministic address.
    #[ortho_config(default = false, skip_cli)]
    pub stub_mode: bool,
    /// Daemon executable started by the provisioner.
    #[ortho_config(default = default_tor_binary())]
    pub tor_binary: String,
    /// Daemon configuration file maintained by the provisioner.
    pub torrc_path: Option<Utf8PathBuf>,
    /// Daemon data directory maintained by the provisioner.
    pub data_dir: Option<Utf8PathBuf>,
    /// Notices log the daemon writes, when set.
    pub tor_log_file: Option<Utf8PathBuf>,
    /// Wait for the cookie file after spawning, in milliseconds.
    #[ortho_config(default = DEFAULT_COOKIE_TIMEOUT_MS)]
    pub cookie_timeout_ms: u64,
    /// Wait for the control port to accept connections, in milliseconds.
    #[ortho_config(default = DEFAULT_CONTROL_TIMEOUT_MS)]
    pub control_timeout_ms: u64,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = LogFormat::Compact)]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_bind_address: default_local_bind_address(),
            local_port: DEFAULT_LOCAL_PORT,
            virtual_port: DEFAULT_VIRTUAL_PORT,
            control_host: default_control_host(),
            control_port: DEFAULT_CONTROL_PORT,
            auth_mode: AuthMode::default(),
            cookie_path: default_cookie_path(),
            persistence: PersistenceMode::default(),
            provided_key: None,
            bootstrap_timeout_ms: DEFAULT_BOOTSTRAP_TIMEOUT_MS,
            wait_for_bootstrap: true,
            redact_secrets: true,
            stub_mode: false,
            tor_binary: default_tor_binary(),
            torrc_path: None,
            data_dir: None,
            tor_log_file: None,
            cookie_timeout_ms: DEFAULT_COOKIE_TIMEOUT_MS,
            control_timeout_ms: DEFAULT_CONTROL_TIMEOUT_MS,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Config")
            .field("local_bind_address", &self.local_bind_address)
            .field("local_port", &self.local_port)
            .field("virtual_port", &self.virtual_port)
            .field("control_host", &self.control_host)
            .field("control_port", &self.control_port)
            .field("auth_mode", &self.auth_mode)
            .field("cookie_path", &self.cookie_path)
            .field("persistence", &self.persistence)
            .field(
                "provided_key",
                &self.provided_key.as_ref().map(|_| "<redacted>"),
            )
            .field("bootstrap_timeout_ms", &self.bootstrap_timeout_ms)
            .field("wait_for_bootstrap", &self.wait_for_bootstrap)
            .field("redact_secrets", &self.redact_secrets)
            .field("stub_mode", &self.stub_mode)
            .field("tor_binary", &self.tor_binary)
            .field("torrc_path", &self.torrc_path)
            .field("data_dir", &self.data_dir)
            .field("tor_log_file", &self.tor_log_file)
            .field("cookie_timeout_ms", &self.cookie_timeout_ms)
            .field("control_timeout_ms", &self.control_timeout_ms)
            .field("log_filter", &self.log_filter)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Control endpoint rendered as `host:port`.
    #[must_use]
    pub fn control_endpoint(&self) -> String {
        format!("{}:{}", self.control_host, self.control_port)
    }

    /// Local forward target rendered as `address:port`.
    #[must_use]
    pub fn local_endpoint(&self) -> String {
        format!("{}:{}", self.local_bind_address, self.local_port)
    }

    /// Bootstrap wait as a [`Duration`].
    #[must_use]
    pub const fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    /// Cookie wait used by the provisioner.
    #[must_use]
    pub const fn cookie_timeout(&self) -> Duration {
        Duration::from_millis(self.cookie_timeout_ms)
    }

    /// Control port wait used by the provisioner.
    #[must_use]
    pub const fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Rejects settings that no layer should be able to produce.
    ///
    /// The provided-key requirement is deliberately not checked here; the
    /// control client enforces it when the service is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ports = [
            ("local_port", self.local_port),
            ("virtual_port", self.virtual_port),
            ("control_port", self.control_port),
        ];
        if let Some(&(field, _)) = ports.iter().find(|(_, port)| *port == 0) {
            return Err(ConfigError::ZeroPort { field });
        }
        if self.local_bind_address.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "local_bind_address",
            });
        }
        if self.control_host.trim().is_empty() {
            return Err(ConfigError::Empty {
                field: "control_host",
            });
        }
        if self.wait_for_bootstrap && self.bootstrap_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "bootstrap_timeout_ms",
            });
        }
        Ok(())
    }
}

/// Errors raised by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A port setting was zero.
    #[error("{field} must be a non-zero port")]
    ZeroPort {
        /// Offending field.
        field: &'static str,
    },
    /// A required text setting was blank.
    #[error("{field} must not be empty")]
    Empty {
        /// Offending field.
        field: &'static str,
    },
    /// A timeout that gates a wait was zero.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Offending field.
        field: &'static str,
    },
}
