//! Control-port authentication strategies.
//!
//! The strategy is chosen once from [`ServiceConfig`] by
//! [`authenticator_for`]; the controller never branches on the mode itself.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use onion_config::AuthMode;
use tracing::{debug, info};

use crate::channel::CommandChannel;
use crate::command::Command;
use crate::config::ServiceConfig;
use crate::encoding::hex_upper;
use crate::error::ControlError;
use crate::secret::{SecretString, redact};

const AUTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::auth");

/// Proves the client's identity on an open channel.
pub trait Authenticator: Send {
    /// Runs the authentication exchange.
    ///
    /// # Errors
    ///
    /// Returns an authentication [`ControlError`] when credentials are
    /// unavailable or refused, or the channel error when the exchange fails.
    fn authenticate(&self, channel: &mut dyn CommandChannel) -> Result<(), ControlError>;
}

/// Reads the daemon's cookie file and sends it as uppercase hex.
///
/// The cookie is read fresh on every attempt so a restarted daemon's new
/// cookie is picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAuthenticator {
    cookie_path: Utf8PathBuf,
    redact_secrets: bool,
}

impl CookieAuthenticator {
    /// Creates an authenticator for the cookie at `cookie_path`.
    #[must_use]
    pub fn new(cookie_path: impl Into<Utf8PathBuf>, redact_secrets: bool) -> Self {
        Self {
            cookie_path: cookie_path.into(),
            redact_secrets,
        }
    }

    /// Reads the cookie bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::CookieRead`] when the file cannot be read and
    /// [`ControlError::CookieEmpty`] when it holds no bytes.
    pub fn read_cookie(&self) -> Result<Vec<u8>, ControlError> {
        let bytes = fs::read(&self.cookie_path).map_err(|source| ControlError::CookieRead {
            path: self.display_path(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(ControlError::CookieEmpty {
                path: self.display_path(),
            });
        }
        Ok(bytes)
    }

    fn display_path(&self) -> String {
        redact(self.cookie_path.as_str(), self.redact_secrets).to_owned()
    }
}

impl Authenticator for CookieAuthenticator {
    fn authenticate(&self, channel: &mut dyn CommandChannel) -> Result<(), ControlError> {
        let cookie = self.read_cookie()?;
        debug!(
            target: AUTH_TARGET,
            path = %self.display_path(),
            bytes = cookie.len(),
            "read authentication cookie"
        );
        let command = Command::authenticate(&SecretString::new(hex_upper(&cookie)))?;
        let reply = channel.send(&command)?;
        if !reply.is_success() {
            return Err(ControlError::AuthenticationRejected {
                reply: reply.final_line().to_owned(),
            });
        }
        info!(target: AUTH_TARGET, "authenticated with control port");
        Ok(())
    }
}

/// Stands in for modes that are not implemented; always fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedAuthenticator {
    mode: AuthMode,
}

impl UnsupportedAuthenticator {
    /// Creates the authenticator for `mode`.
    #[must_use]
    pub const fn new(mode: AuthMode) -> Self {
        Self { mode }
    }
}

impl Authenticator for UnsupportedAuthenticator {
    fn authenticate(&self, _channel: &mut dyn CommandChannel) -> Result<(), ControlError> {
        Err(ControlError::AuthenticationUnsupported { mode: self.mode })
    }
}

/// Succeeds without I/O. Used in stub mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticAuthenticator;

impl Authenticator for SyntheticAuthenticator {
    fn authenticate(&self, _channel: &mut dyn CommandChannel) -> Result<(), ControlError> {
        debug!(target: AUTH_TARGET, "skipping authentication in stub mode");
        Ok(())
    }
}

/// Selects the authentication strategy for `config`.
#[must_use]
pub fn authenticator_for(config: &ServiceConfig) -> Box<dyn Authenticator> {
    if config.stub_mode {
        return Box::new(SyntheticAuthenticator);
    }
    match config.auth_mode {
        AuthMode::Cookie => Box::new(CookieAuthenticator::new(
            config.cookie_path.clone(),
            config.redact_secrets,
        )),
        mode @ (AuthMode::Password | AuthMode::None) => Box::new(UnsupportedAuthenticator::new(mode)),
    }
}

/// Reports whether a cookie file exists and is non-empty.
///
/// Used by diagnostics, which want an answer without a channel.
///
/// # Errors
///
/// Returns the filesystem error when the file cannot be inspected.
pub fn cookie_is_readable(path: &Utf8Path) -> io::Result<bool> {
    fs::metadata(path).map(|metadata| metadata.is_file() && metadata.len() > 0)
}
