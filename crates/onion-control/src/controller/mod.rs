//! Orchestrates connect, authenticate, bootstrap, publish and teardown.

mod state;

use std::fmt;

use tracing::{debug, info, warn};

pub use state::{LifecycleState, ServiceRecord, TeardownOutcome};

use crate::address::{AddressError, OnionAddress, is_v3_service_id};
use crate::auth::{Authenticator, authenticator_for};
use crate::bootstrap::BootstrapMonitor;
use crate::channel::{CommandChannel, Connector, SyntheticConnector, TcpConnector};
use crate::command::{AddOnionReply, AddOnionRequest, Command};
use crate::config::ServiceConfig;
use crate::error::ControlError;
use crate::secret::SecretString;
use crate::stub::stub_service_id;

const CONTROLLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::controller");

/// Publishes one onion service and removes it again.
///
/// The controller owns at most one channel and at most one published
/// service. [`setup`](Self::setup) runs the whole lifecycle and closes the
/// channel if any step after connecting fails. [`teardown`](Self::teardown)
/// is safe to call at any time and any number of times. Dropping the
/// controller performs a best-effort teardown.
pub struct HiddenServiceController {
    config: ServiceConfig,
    connector: Box<dyn Connector>,
    authenticator: Box<dyn Authenticator>,
    monitor: BootstrapMonitor,
    channel: Option<Box<dyn CommandChannel>>,
    authenticated: bool,
    record: ServiceRecord,
    state: LifecycleState,
}

impl HiddenServiceController {
    /// Creates a controller wired for `config`.
    ///
    /// Stub mode selects the synthetic connector and authenticator; otherwise
    /// the TCP connector and the authenticator for the configured mode are
    /// used.
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        let connector: Box<dyn Connector> = if config.stub_mode {
            Box::new(SyntheticConnector::new(stub_service_id(
                &config.local_bind_address,
                config.local_port,
                config.virtual_port,
            )))
        } else {
            Box::new(TcpConnector::default())
        };
        let authenticator = authenticator_for(&config);
        Self::with_parts(config, connector, authenticator)
    }

    /// Creates a controller with explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: ServiceConfig,
        connector: Box<dyn Connector>,
        authenticator: Box<dyn Authenticator>,
    ) -> Self {
        Self {
            config,
            connector,
            authenticator,
            monitor: BootstrapMonitor::new(),
            channel: None,
            authenticated: false,
            record: ServiceRecord::default(),
            state: LifecycleState::Idle,
        }
    }

    /// Replaces the bootstrap monitor.
    #[must_use]
    pub fn with_monitor(mut self, monitor: BootstrapMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Settings the controller was built with.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns `true` while a channel is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Returns `true` once the open channel is authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Returns `true` while a service is published.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.record.is_ready()
    }

    /// Identifier of the published service; empty when none is published.
    #[must_use]
    pub fn service_id(&self) -> &str {
        self.record.service_id()
    }

    /// Address of the published service.
    #[must_use]
    pub fn onion_address(&self) -> Option<OnionAddress> {
        self.record.address()
    }

    /// Key the daemon generated for an ephemeral service.
    #[must_use]
    pub const fn private_key(&self) -> Option<&SecretString> {
        self.record.private_key()
    }

    /// The published service record.
    #[must_use]
    pub const fn record(&self) -> &ServiceRecord {
        &self.record
    }

    /// Publishes the service and returns its address.
    ///
    /// Calling `setup` while a service is already published returns the
    /// existing address without contacting the daemon. Steps already completed
    /// through [`connect`](Self::connect), [`authenticate`](Self::authenticate)
    /// or [`await_bootstrap`](Self::await_bootstrap) are not repeated.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's [`ControlError`]. A bootstrap wait
    /// that expires yields [`ControlError::BootstrapTimeout`]. On any failure
    /// after connecting the channel is closed before returning.
    pub fn setup(&mut self) -> Result<OnionAddress, ControlError> {
        if let Some(address) = self.onion_address() {
            debug!(target: CONTROLLER_TARGET, %address, "service already published");
            return Ok(address);
        }
        if self.config.stub_mode {
            info!(target: CONTROLLER_TARGET, "stub mode active; daemon I/O is synthetic");
        }
        self.connect()?;
        let result = self.establish();
        if let Err(error) = &result {
            warn!(target: CONTROLLER_TARGET, %error, "setup failed; closing control connection");
            self.abandon_connection();
        }
        result
    }

    fn establish(&mut self) -> Result<OnionAddress, ControlError> {
        if !self.authenticated {
            self.authenticate()?;
        }
        let bootstrapped = self.state == LifecycleState::Bootstrapped;
        if self.config.wait_for_bootstrap && !bootstrapped && !self.await_bootstrap()? {
            return Err(ControlError::BootstrapTimeout {
                timeout_ms: self.config.bootstrap_timeout.as_millis(),
            });
        }
        let address = self.create_service()?;
        info!(
            target: CONTROLLER_TARGET,
            %address,
            virtual_port = self.config.virtual_port,
            local_port = self.config.local_port,
            stub = self.config.stub_mode,
            "service published"
        );
        Ok(address)
    }

    /// Opens a channel unless one is already open.
    ///
    /// # Errors
    ///
    /// Returns the connector's [`ControlError`].
    pub fn connect(&mut self) -> Result<(), ControlError> {
        if self.channel.is_some() {
            return Ok(());
        }
        let channel = self.connector.connect(&self.config.control)?;
        self.channel = Some(channel);
        self.authenticated = false;
        self.state = LifecycleState::Connected;
        Ok(())
    }

    /// Authenticates the open channel.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::NotConnected`] without a channel, otherwise
    /// the authenticator's error.
    pub fn authenticate(&mut self) -> Result<(), ControlError> {
        let channel = self
            .channel
            .as_deref_mut()
            .ok_or(ControlError::NotConnected)?;
        self.authenticator.authenticate(channel)?;
        self.authenticated = true;
        self.state = LifecycleState::Authenticated;
        Ok(())
    }

    /// Waits up to the configured timeout for bootstrap to complete.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::NotConnected`] or
    /// [`ControlError::NotAuthenticated`] when called out of order, otherwise
    /// the monitor's error.
    pub fn await_bootstrap(&mut self) -> Result<bool, ControlError> {
        let channel = self
            .channel
            .as_deref_mut()
            .ok_or(ControlError::NotConnected)?;
        if !self.authenticated {
            return Err(ControlError::NotAuthenticated);
        }
        let ready = self
            .monitor
            .await_ready(channel, self.config.bootstrap_timeout)?;
        if ready {
            self.state = LifecycleState::Bootstrapped;
        }
        Ok(ready)
    }

    fn create_service(&mut self) -> Result<OnionAddress, ControlError> {
        let request = AddOnionRequest::from_config(&self.config)?;
        let command = Command::add_onion(&request)?;
        let channel = self
            .channel
            .as_deref_mut()
            .ok_or(ControlError::NotConnected)?;
        let reply = channel.send(&command)?;
        if !reply.is_success() {
            return Err(ControlError::CreateRejected {
                reply: reply.final_line().to_owned(),
            });
        }
        let created = AddOnionReply::parse(&reply, &request.key)?;
        let address = OnionAddress::from_service_id(&created.service_id)
            .map_err(|source| ControlError::InvalidServiceId { source })?;
        self.record.populate(created.service_id, created.private_key);
        self.state = LifecycleState::ServiceReady;
        Ok(address)
    }

    fn remove_service(&mut self) -> Result<(), ControlError> {
        if !self.record.is_ready() {
            return Ok(());
        }
        let command = Command::del_onion(self.record.service_id())?;
        let channel = self
            .channel
            .as_deref_mut()
            .ok_or(ControlError::NotConnected)?;
        let reply = channel.send(&command)?;
        if !reply.is_success() {
            return Err(ControlError::RemoveRejected {
                reply: reply.final_line().to_owned(),
            });
        }
        Ok(())
    }

    /// Closes the channel, if any.
    ///
    /// # Errors
    ///
    /// Returns the channel's close error. The channel is released either way.
    pub fn close(&mut self) -> Result<(), ControlError> {
        self.authenticated = false;
        match self.channel.take() {
            Some(mut channel) => channel.close(),
            None => Ok(()),
        }
    }

    fn abandon_connection(&mut self) {
        if let Err(error) = self.close() {
            warn!(target: CONTROLLER_TARGET, %error, "failed to close control connection");
        }
        self.state = LifecycleState::Idle;
    }

    /// Removes the published service and closes the channel.
    ///
    /// Without a published service or open channel this is a no-op that
    /// never contacts the daemon. Local state is cleared even when removal
    /// fails, so a later [`setup`](Self::setup) starts fresh.
    pub fn teardown(&mut self) -> TeardownOutcome {
        if !self.record.is_ready() && self.channel.is_none() {
            return TeardownOutcome::NoOp;
        }
        let mut warnings = Vec::new();
        let service_id = self.record.service_id().to_owned();
        if let Err(error) = self.remove_service() {
            warn!(
                target: CONTROLLER_TARGET,
                %error,
                service_id = %service_id,
                "failed to remove service"
            );
            warnings.push(format!("failed to remove service {service_id}: {error}"));
        }
        if let Err(error) = self.close() {
            warn!(target: CONTROLLER_TARGET, %error, "failed to close control connection");
            warnings.push(format!("failed to close control connection: {error}"));
        }
        self.record.clear();
        self.state = LifecycleState::TornDown;
        if warnings.is_empty() {
            info!(target: CONTROLLER_TARGET, service_id = %service_id, "service torn down");
            TeardownOutcome::Clean
        } else {
            TeardownOutcome::Degraded { warnings }
        }
    }

    /// Publishes and immediately removes a service.
    ///
    /// Outside stub mode the identifier must have the version 3 shape.
    ///
    /// # Errors
    ///
    /// Returns the setup error, [`ControlError::InvalidServiceId`] for a
    /// malformed identifier, or [`ControlError::TeardownIncomplete`] when
    /// teardown reported warnings.
    pub fn verify_round_trip(&mut self) -> Result<OnionAddress, ControlError> {
        let address = self.setup()?;
        let well_formed = self.config.stub_mode || is_v3_service_id(address.service_id());
        let outcome = self.teardown();
        if !well_formed {
            return Err(ControlError::InvalidServiceId {
                source: AddressError::NotVersion3(address.service_id().to_owned()),
            });
        }
        if !outcome.is_clean() {
            return Err(ControlError::TeardownIncomplete {
                warnings: outcome.warnings().join("; "),
            });
        }
        Ok(address)
    }
}

impl fmt::Debug for HiddenServiceController {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HiddenServiceController")
            .field("state", &self.state)
            .field("connected", &self.channel.is_some())
            .field("authenticated", &self.authenticated)
            .field("record", &self.record)
            .field("stub_mode", &self.config.stub_mode)
            .finish_non_exhaustive()
    }
}

impl Drop for HiddenServiceController {
    fn drop(&mut self) {
        if self.record.is_ready() || self.channel.is_some() {
            let outcome = self.teardown();
            debug!(target: CONTROLLER_TARGET, ?outcome, "teardown on drop");
        }
    }
}
