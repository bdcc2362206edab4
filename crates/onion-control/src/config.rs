//! Settings consumed by the controller.

use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use onion_config::{
    AuthMode, Config, DEFAULT_BOOTSTRAP_TIMEOUT_MS, DEFAULT_CONTROL_PORT, DEFAULT_LOCAL_PORT,
    DEFAULT_VIRTUAL_PORT, PersistenceMode, default_control_host, default_cookie_path,
    default_local_bind_address,
};

use crate::secret::SecretString;

/// Host and port of the control daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlEndpoint {
    /// Host name or IP literal.
    pub host: String,
    /// Control port.
    pub port: u16,
}

impl ControlEndpoint {
    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for ControlEndpoint {
    fn default() -> Self {
        Self::new(default_control_host(), DEFAULT_CONTROL_PORT)
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(formatter, "[{}]:{}", self.host, self.port)
        } else {
            write!(formatter, "{}:{}", self.host, self.port)
        }
    }
}

/// Everything the controller needs to publish one service.
///
/// Built from a resolved [`Config`] via `From<&Config>`; tests construct it
/// directly with struct update syntax over [`ServiceConfig::default`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the forwarded local service listens on.
    pub local_bind_address: String,
    /// Port the forwarded local service listens on.
    pub local_port: u16,
    /// Port exposed on the published address.
    pub virtual_port: u16,
    /// Control daemon endpoint.
    pub control: ControlEndpoint,
    /// Authentication mode.
    pub auth_mode: AuthMode,
    /// Cookie file used by cookie authentication.
    pub cookie_path: Utf8PathBuf,
    /// Key ownership.
    pub persistence: PersistenceMode,
    /// Key material for [`PersistenceMode::ProvidedKey`].
    pub provided_key: Option<SecretString>,
    /// Upper bound on the bootstrap wait.
    pub bootstrap_timeout: Duration,
    /// Whether setup waits for bootstrap before creating the service.
    pub wait_for_bootstrap: bool,
    /// Masks secret-adjacent values in errors and logs.
    pub redact_secrets: bool,
    /// Replaces daemon I/O with synthetic replies.
    pub stub_mode: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            local_bind_address: default_local_bind_address(),
            local_port: DEFAULT_LOCAL_PORT,
            virtual_port: DEFAULT_VIRTUAL_PORT,
            control: ControlEndpoint::default(),
            auth_mode: AuthMode::default(),
            cookie_path: default_cookie_path(),
            persistence: PersistenceMode::default(),
            provided_key: None,
            bootstrap_timeout: Duration::from_millis(DEFAULT_BOOTSTRAP_TIMEOUT_MS),
            wait_for_bootstrap: true,
            redact_secrets: true,
            stub_mode: false,
        }
    }
}

impl From<&Config> for ServiceConfig {
    fn from(config: &Config) -> Self {
        Self {
            local_bind_address: config.local_bind_address.clone(),
            local_port: config.local_port,
            virtual_port: config.virtual_port,
            control: ControlEndpoint::new(config.control_host.clone(), config.control_port),
            auth_mode: config.auth_mode,
            cookie_path: config.cookie_path.clone(),
            persistence: config.persistence,
            provided_key: config
                .provided_key
                .as_ref()
                .filter(|key| !key.trim().is_empty())
                .map(|key| SecretString::from(key.trim())),
            bootstrap_timeout: config.bootstrap_timeout(),
            wait_for_bootstrap: config.wait_for_bootstrap,
            redact_secrets: config.redact_secrets,
            stub_mode: config.stub_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_carries_every_setting() {
        let config = Config {
            control_port: 9151,
            persistence: PersistenceMode::ProvidedKey,
            provided_key: Some(String::from("  ED25519-V3:a2V5  ")),
            stub_mode: true,
            ..Config::default()
        };
        let service = ServiceConfig::from(&config);
        assert_eq!(service.control, ControlEndpoint::new("127.0.0.1", 9151));
        assert_eq!(service.persistence, PersistenceMode::ProvidedKey);
        assert_eq!(
            service.provided_key.as_ref().map(SecretString::expose),
            Some("ED25519-V3:a2V5")
        );
        assert!(service.stub_mode);
    }

    #[test]
    fn blank_provided_key_counts_as_absent() {
        let config = Config {
            provided_key: Some(String::from("   ")),
            ..Config::default()
        };
        assert!(ServiceConfig::from(&config).provided_key.is_none());
    }

    #[test]
    fn ipv6_endpoints_are_bracketed() {
        assert_eq!(ControlEndpoint::new("::1", 9051).to_string(), "[::1]:9051");
    }
}
