//! Command-line interface definition for `onionctl`.

use clap::{Parser, Subcommand};

/// Publishes a local TCP service as an onion service.
///
/// Configuration flags such as `--control-port` must precede the subcommand.
#[derive(Parser, Debug)]
#[command(name = "onionctl", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Publishes the service, serves it until interrupted, then removes it.
    Up {
        /// Prepares and starts the daemon before publishing.
        #[arg(long)]
        provision: bool,
        /// Publishes without starting the built-in echo service.
        #[arg(long)]
        no_local_service: bool,
    },
    /// Runs the lifecycle step by step and reports each step.
    Check,
    /// Prepares the daemon configuration and starts the daemon if needed.
    Provision,
}
