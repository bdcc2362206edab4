//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use onion_config::ConfigError;
use onion_control::ControlError;
use thiserror::Error;

use crate::provision::ProvisionError;
use crate::server::ServerError;
use crate::shutdown::ShutdownError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
    #[error("{category} error: {inner}", category = .0.category(), inner = .0)]
    Control(#[from] ControlError),
    #[error("local service failed: {0}")]
    LocalService(#[from] ServerError),
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("{failed} of {total} checks failed")]
    ChecksFailed { failed: usize, total: usize },
}

impl AppError {
    /// Usage mistakes exit with 2, like `clap` does; everything else with 1.
    pub(crate) const fn exit_status(&self) -> u8 {
        match self {
            Self::CliUsage(_) | Self::InvalidConfiguration(_) => 2,
            _ => 1,
        }
    }
}
