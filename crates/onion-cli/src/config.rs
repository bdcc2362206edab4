//! Configuration loading for `onionctl`.
//!
//! Configuration flags are separated from the subcommand tokens so
//! `ortho_config` only sees the flags it understands and `clap` only sees the
//! subcommand.

use std::ffi::{OsStr, OsString};

use onion_config::{BOOL_FLAGS, Config};

use crate::AppError;

/// Flags accepted by the configuration loader. Must match the fields of
/// [`Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--local-bind-address",
    "--local-port",
    "--virtual-port",
    "--control-host",
    "--control-port",
    "--auth-mode",
    "--cookie-path",
    "--persistence",
    "--provided-key",
    "--bootstrap-timeout-ms",
    "--wait-for-bootstrap",
    "--redact-secrets",
    "--stub-mode",
    "--tor-binary",
    "--torrc-path",
    "--data-dir",
    "--tor-log-file",
    "--cookie-timeout-ms",
    "--control-timeout-ms",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the given configuration arguments.
    ///
    /// Configuration flags must appear before the subcommand; flags after it
    /// are handed to the subcommand parser.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_args(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { value: ValueRule },
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueRule {
    None,
    Required,
    OptionalBool,
}

fn classify_flag(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if !CONFIG_CLI_FLAGS.contains(&flag) {
        return FlagAction::Skip;
    }
    let value = if inline_value {
        ValueRule::None
    } else if BOOL_FLAGS.contains(&flag) {
        ValueRule::OptionalBool
    } else {
        ValueRule::Required
    };
    FlagAction::Include { value }
}

fn is_bool_literal(argument: &OsStr) -> bool {
    matches!(argument.to_str(), Some("true" | "false"))
}

/// Configuration arguments (with the program name first) and the index at
/// which the subcommand tokens begin.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some(program) = args.first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut remaining = args.iter().skip(1).peekable();
    let mut command_start = 1;

    while let Some(argument) = remaining.peek().copied() {
        let FlagAction::Include { value } = classify_flag(argument) else {
            break;
        };
        config_arguments.push(argument.clone());
        remaining.next();
        command_start += 1;
        let take_value = match value {
            ValueRule::None => false,
            ValueRule::Required => remaining.peek().is_some(),
            ValueRule::OptionalBool => remaining.peek().is_some_and(|next| is_bool_literal(next)),
        };
        if take_value && let Some(next) = remaining.next() {
            config_arguments.push(next.clone());
            command_start += 1;
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start,
    }
}

/// The program name followed by the subcommand tokens.
pub(crate) fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    args.first()
        .into_iter()
        .chain(args.iter().skip(split.command_start))
        .cloned()
        .collect()
}
