//! Entrypoint for `onionctl`.
//!
//! Delegates to [`onion_cli::run`], which loads configuration, parses the
//! subcommand and drives the control client.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    onion_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
