//! Lifecycle bookkeeping for the controller.

use std::fmt;

use crate::address::OnionAddress;
use crate::secret::SecretString;

/// Where the controller is in the publish lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Nothing has happened yet, or an attempt was abandoned.
    #[default]
    Idle,
    /// A channel is open.
    Connected,
    /// The channel is authenticated.
    Authenticated,
    /// The daemon reported bootstrap completion.
    Bootstrapped,
    /// A service is published.
    ServiceReady,
    /// The service was removed and the channel closed.
    TornDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Bootstrapped => "bootstrapped",
            Self::ServiceReady => "service_ready",
            Self::TornDown => "torn_down",
        };
        formatter.write_str(label)
    }
}

/// The published service, if any.
///
/// A record is ready exactly when it holds a non-empty service identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRecord {
    service_id: String,
    private_key: Option<SecretString>,
}

impl ServiceRecord {
    /// Identifier of the published service; empty when none is published.
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Key generated by the daemon for an ephemeral service.
    #[must_use]
    pub const fn private_key(&self) -> Option<&SecretString> {
        self.private_key.as_ref()
    }

    /// Returns `true` while a service is published.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.service_id.is_empty()
    }

    /// Address of the published service.
    #[must_use]
    pub fn address(&self) -> Option<OnionAddress> {
        OnionAddress::from_service_id(&self.service_id).ok()
    }

    pub(crate) fn populate(&mut self, service_id: String, private_key: Option<SecretString>) {
        self.service_id = service_id;
        self.private_key = private_key;
    }

    pub(crate) fn clear(&mut self) {
        self.service_id.clear();
        self.private_key = None;
    }
}

/// Result of [`HiddenServiceController::teardown`](super::HiddenServiceController::teardown).
///
/// Teardown never fails outright. Problems are reported as warnings so the
/// caller can log them and carry on shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum TeardownOutcome {
    /// Nothing was published or connected.
    NoOp,
    /// The service was removed and the channel closed.
    Clean,
    /// Teardown finished but some steps failed.
    Degraded {
        /// One entry per failed step.
        warnings: Vec<String>,
    },
}

impl TeardownOutcome {
    /// Returns `true` unless a step failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !matches!(self, Self::Degraded { .. })
    }

    /// Warnings from failed steps.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Degraded { warnings } => warnings,
            Self::NoOp | Self::Clean => &[],
        }
    }
}
