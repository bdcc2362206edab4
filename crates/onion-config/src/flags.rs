//! Boolean switches on the command line.
//!
//! `ortho_config` renders `bool` fields as set-true switches that report
//! `false` when absent, which would mask the defaults, the file and the
//! environment. Those fields are kept out of its parser and applied here,
//! only when the switch is actually present.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};

use crate::Config;

/// Long flags of the boolean settings.
///
/// Each accepts `--flag`, `--flag true|false` or `--flag=true|false`.
pub const BOOL_FLAGS: [&str; 3] = ["--wait-for-bootstrap", "--redact-secrets", "--stub-mode"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolSetting {
    WaitForBootstrap,
    RedactSecrets,
    StubMode,
}

impl BoolSetting {
    const ALL: [Self; 3] = [Self::WaitForBootstrap, Self::RedactSecrets, Self::StubMode];

    const fn flag(self) -> &'static str {
        match self {
            Self::WaitForBootstrap => "--wait-for-bootstrap",
            Self::RedactSecrets => "--redact-secrets",
            Self::StubMode => "--stub-mode",
        }
    }

    const fn key(self) -> &'static str {
        match self {
            Self::WaitForBootstrap => "wait_for_bootstrap",
            Self::RedactSecrets => "redact_secrets",
            Self::StubMode => "stub_mode",
        }
    }

    fn from_flag(flag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|setting| setting.flag() == flag)
    }

    fn apply(self, config: &mut Config, value: bool) {
        match self {
            Self::WaitForBootstrap => config.wait_for_bootstrap = value,
            Self::RedactSecrets => config.redact_secrets = value,
            Self::StubMode => config.stub_mode = value,
        }
    }

    fn parse(self, value: &str) -> Result<bool, Arc<OrthoError>> {
        parse_bool_literal(value).ok_or_else(|| {
            Arc::new(OrthoError::Validation {
                key: self.key().to_owned(),
                message: format!("expected 'true' or 'false', found '{value}'"),
            })
        })
    }
}

fn parse_bool_literal(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

type Switches = Vec<(BoolSetting, bool)>;

/// Removes boolean switches from `args`, returning the remaining arguments
/// and the switches in command-line order.
fn extract_switches(
    args: impl IntoIterator<Item = OsString>,
) -> Result<(Vec<OsString>, Switches), Arc<OrthoError>> {
    let mut remaining = Vec::new();
    let mut switches = Vec::new();
    let mut args = args.into_iter().peekable();

    while let Some(argument) = args.next() {
        let Some(text) = argument.to_str() else {
            remaining.push(argument);
            continue;
        };
        let (flag, inline) = match text.split_once('=') {
            Some((flag, value)) => (flag, Some(value)),
            None => (text, None),
        };
        let Some(setting) = BoolSetting::from_flag(flag) else {
            remaining.push(argument);
            continue;
        };
        let value = match inline {
            Some(value) => setting.parse(value)?,
            None => {
                let literal = args
                    .peek()
                    .and_then(|next| next.to_str())
                    .and_then(parse_bool_literal);
                if literal.is_some() {
                    args.next();
                }
                literal.unwrap_or(true)
            }
        };
        switches.push((setting, value));
    }

    Ok((remaining, switches))
}

impl Config {
    /// Loads every configuration layer from `args`, then applies any
    /// boolean switches present in `args` on top.
    ///
    /// # Errors
    ///
    /// Returns the `ortho_config` failure when a layer cannot be loaded, or a
    /// validation error when a boolean switch carries a value other than
    /// `true` or `false`.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let (remaining, switches) = extract_switches(args.into_iter().map(Into::into))?;
        let mut config = Self::load_from_iter(remaining)?;
        for (setting, value) in switches {
            setting.apply(&mut config, value);
        }
        Ok(config)
    }
}
