//! Control-port client and onion service lifecycle for a Tor-style daemon.
//!
//! The crate speaks the daemon's line-oriented control protocol over a local
//! TCP connection. Callers build a [`ServiceConfig`], hand it to a
//! [`HiddenServiceController`], and drive the service through
//! [`HiddenServiceController::setup`] and
//! [`HiddenServiceController::teardown`].
//!
//! Internally the layers are strictly stacked: the controller talks to an
//! [`Authenticator`] and a [`BootstrapMonitor`], both of which exchange
//! [`Command`]s over a [`CommandChannel`], which frames the byte stream into
//! [`ReplyBlock`]s with a [`ReplyFramer`].
//!
//! ## Stub mode
//!
//! With [`ServiceConfig::stub_mode`] set, the controller is wired to a
//! [`SyntheticConnector`] and [`SyntheticAuthenticator`] instead of the
//! networked implementations. No socket is opened and no cookie is read, yet
//! every step of the lifecycle runs through the same code. The address is
//! derived from the forwarded port mapping by [`stub_service_id`], so the same
//! configuration always yields the same address.

mod address;
mod auth;
mod bootstrap;
mod channel;
mod command;
mod config;
mod controller;
mod encoding;
mod error;
mod reply;
mod secret;
mod stub;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

pub use address::{AddressError, ONION_SUFFIX, OnionAddress, is_v3_service_id};
pub use auth::{
    Authenticator, CookieAuthenticator, SyntheticAuthenticator, UnsupportedAuthenticator,
    authenticator_for, cookie_is_readable,
};
pub use bootstrap::{
    BOOTSTRAP_PHASE_KEY, BootstrapMonitor, BootstrapStatus, POLL_INTERVAL, parse_progress,
};
pub use channel::{
    CONNECTION_TIMEOUT, CloseStream, CommandChannel, Connector, REPLY_TIMEOUT, StreamChannel,
    SyntheticChannel, SyntheticConnector, TcpChannel, TcpConnector,
};
pub use command::{AddOnionReply, AddOnionRequest, Command, KeySpec, PortMapping};
pub use config::{ControlEndpoint, ServiceConfig};
pub use controller::{HiddenServiceController, LifecycleState, ServiceRecord, TeardownOutcome};
pub use error::{ControlError, ErrorCategory};
pub use reply::{MAX_LINE_LENGTH, ReplyBlock, ReplyFramer};
pub use secret::{REDACTED, SecretString, redact};
pub use stub::stub_service_id;

pub use onion_config::{AuthMode, PersistenceMode};
