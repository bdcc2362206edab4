//! Subcommand implementations.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use onion_config::Config;
use onion_control::{HiddenServiceController, ServiceConfig, TeardownOutcome};
use tracing::info;

use crate::diagnostics::run_checks;
use crate::provision::{ProvisionPlan, Provisioner};
use crate::server::{EchoProtocol, LocalService, ServiceHandle};
use crate::shutdown::ShutdownSignal;
use crate::{AppError, IoStreams};

const COMMAND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::command");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpOptions {
    pub(crate) provision: bool,
    pub(crate) local_service: bool,
}

/// Publishes the service, serves until shutdown, then tears everything down.
pub(crate) fn up<W: Write, E: Write>(
    config: &Config,
    options: UpOptions,
    io: &mut IoStreams<'_, W, E>,
    shutdown: &dyn ShutdownSignal,
) -> Result<ExitCode, AppError> {
    if options.provision {
        if config.stub_mode {
            info!(target: COMMAND_TARGET, "stub mode active; skipping provisioning");
        } else {
            provision_daemon(config, io.stderr)?;
        }
    }

    let server = if options.local_service {
        let service = LocalService::bind(&config.local_bind_address, config.local_port)?;
        writeln!(io.stderr, "serving {} with the echo protocol", service.local_addr())?;
        Some(service.start(Arc::new(EchoProtocol))?)
    } else {
        None
    };

    let mut controller = HiddenServiceController::new(ServiceConfig::from(config));
    let published = controller.setup();
    let result = published
        .map_err(AppError::from)
        .and_then(|address| {
            writeln!(io.stdout, "{address}")?;
            io.stdout.flush()?;
            shutdown.wait().map_err(AppError::from)
        });

    if let TeardownOutcome::Degraded { warnings } = controller.teardown() {
        for warning in warnings {
            writeln!(io.stderr, "warning: {warning}")?;
        }
    }
    stop_server(server)?;
    result.map(|()| ExitCode::SUCCESS)
}

/// Runs the lifecycle diagnostics and prints one line per check.
pub(crate) fn check<W: Write, E: Write>(
    config: &Config,
    io: &mut IoStreams<'_, W, E>,
) -> Result<ExitCode, AppError> {
    let report = run_checks(&ServiceConfig::from(config), HiddenServiceController::new);
    report.write_to(io.stdout)?;
    match report.failed() {
        0 => Ok(ExitCode::SUCCESS),
        failed => Err(AppError::ChecksFailed {
            failed,
            total: report.total(),
        }),
    }
}

/// Prepares and starts the daemon, then reports what changed.
pub(crate) fn provision<W: Write, E: Write>(
    config: &Config,
    io: &mut IoStreams<'_, W, E>,
) -> Result<ExitCode, AppError> {
    provision_daemon(config, io.stdout)?;
    Ok(ExitCode::SUCCESS)
}

fn provision_daemon(config: &Config, out: &mut impl Write) -> Result<(), AppError> {
    let plan = ProvisionPlan::from_config(config)?;
    let report = Provisioner::new(plan).run()?;
    writeln!(out, "provisioned: {report}")?;
    Ok(())
}

fn stop_server(server: Option<ServiceHandle>) -> Result<(), AppError> {
    let Some(handle) = server else {
        return Ok(());
    };
    handle.shutdown();
    handle.join()?;
    Ok(())
}
