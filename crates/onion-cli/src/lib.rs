//! Command-line runtime for `onionctl`.
//!
//! The runtime splits configuration flags from the subcommand, loads the
//! layered [`onion_config::Config`], installs telemetry and dispatches to the
//! `up`, `check` or `provision` subcommand. Configuration loading, the
//! shutdown signal and the IO streams can all be substituted in tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

mod cli;
mod commands;
mod config;
mod diagnostics;
mod errors;
mod provision;
mod server;
mod shutdown;
mod telemetry;

use cli::{Cli, CliCommand};
use commands::UpOptions;
use config::{ConfigLoader, OrthoConfigLoader, prepare_cli_arguments, split_config_arguments};
pub(crate) use errors::AppError;
use shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

struct CliRunner<'a, 'io, W: Write, E: Write, L: ConfigLoader> {
    io: &'a mut IoStreams<'io, W, E>,
    loader: &'a L,
    shutdown: &'a dyn ShutdownSignal,
}

impl<'a, 'io, W, E, L> CliRunner<'a, 'io, W, E, L>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    fn new(
        io: &'a mut IoStreams<'io, W, E>,
        loader: &'a L,
        shutdown: &'a dyn ShutdownSignal,
    ) -> Self {
        Self {
            io,
            loader,
            shutdown,
        }
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);
        let cli_arguments = prepare_cli_arguments(&args, &split);

        let cli = match Cli::try_parse_from(cli_arguments) {
            Ok(cli) => cli,
            Err(error)
                if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
            {
                let _ = write!(self.io.stdout, "{error}");
                return ExitCode::SUCCESS;
            }
            Err(error) => return self.report(&AppError::CliUsage(error)),
        };

        match self.execute(cli.command, &split.config_arguments) {
            Ok(exit_code) => exit_code,
            Err(error) => self.report(&error),
        }
    }

    fn execute(
        &mut self,
        command: CliCommand,
        config_arguments: &[OsString],
    ) -> Result<ExitCode, AppError> {
        let config = self.loader.load(config_arguments)?;
        config.validate()?;
        telemetry::initialise(&config)?;

        match command {
            CliCommand::Up {
                provision,
                no_local_service,
            } => {
                let options = UpOptions {
                    provision,
                    local_service: !no_local_service,
                };
                commands::up(&config, options, self.io, self.shutdown)
            }
            CliCommand::Check => commands::check(&config, self.io),
            CliCommand::Provision => commands::provision(&config, self.io),
        }
    }

    fn report(&mut self, error: &AppError) -> ExitCode {
        match error {
            AppError::CliUsage(usage) => {
                let _ = write!(self.io.stderr, "{usage}");
            }
            other => {
                let _ = writeln!(self.io.stderr, "onionctl: {other}");
            }
        }
        ExitCode::from(error.exit_status())
    }
}

/// Runs the CLI using the provided arguments and IO handles.
///
/// Configuration flags must precede the subcommand. Help and version output
/// go to `stdout` and exit successfully; usage mistakes exit with status 2
/// and every other failure with status 1.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    CliRunner::new(&mut io, &OrthoConfigLoader, &SystemShutdownSignal).run(args)
}
