//! Operating modes shared by the control client and the CLI.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the client proves its identity to the control daemon.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AuthMode {
    /// Shared-secret cookie file written by the daemon.
    #[default]
    Cookie,
    /// Hashed control password configured on the daemon.
    Password,
    /// No authentication at all.
    None,
}

/// Whether the published address survives daemon restarts.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PersistenceMode {
    /// The daemon generates a fresh key pair for every service.
    #[default]
    Ephemeral,
    /// The caller supplies key material so the address stays stable.
    ProvidedKey,
}

/// Errors encountered while parsing an [`AuthMode`] or [`PersistenceMode`].
pub type ModeParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("cookie", AuthMode::Cookie)]
    #[case("Password", AuthMode::Password)]
    #[case("NONE", AuthMode::None)]
    fn auth_mode_parses_case_insensitively(#[case] input: &str, #[case] expected: AuthMode) {
        assert_eq!(input.parse::<AuthMode>().expect("parse auth mode"), expected);
    }

    #[test]
    fn persistence_mode_uses_snake_case() {
        assert_eq!(PersistenceMode::ProvidedKey.to_string(), "provided_key");
        assert_eq!(
            "provided_key".parse::<PersistenceMode>().expect("parse persistence"),
            PersistenceMode::ProvidedKey
        );
    }

    #[test]
    fn unknown_modes_are_rejected() {
        assert!("kerberos".parse::<AuthMode>().is_err());
    }
}
