//! Control commands and the replies the controller interprets.

use std::fmt;

use onion_config::PersistenceMode;

use crate::config::ServiceConfig;
use crate::error::ControlError;
use crate::reply::ReplyBlock;
use crate::secret::{REDACTED, SecretString};

const AUTHENTICATE: &str = "AUTHENTICATE";
const GETINFO: &str = "GETINFO";
const ADD_ONION: &str = "ADD_ONION";
const DEL_ONION: &str = "DEL_ONION";

const NEW_KEY_ARGUMENT: &str = "NEW:ED25519-V3";
const DEFAULT_KEY_TYPE: &str = "ED25519-V3";
const SERVICE_ID_KEY: &str = "ServiceID";
const PRIVATE_KEY_KEY: &str = "PrivateKey";

/// A single control command.
///
/// [`Command::line`] renders the exact wire form; `Display` renders the same
/// text with secret arguments replaced by `<redacted>` and without the
/// terminator, for logs and errors.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    keyword: &'static str,
    arguments: Vec<String>,
    secret_arguments: usize,
}

impl Command {
    /// `AUTHENTICATE <hex>`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidArgument`] if the credential contains a
    /// line break.
    pub fn authenticate(credential_hex: &SecretString) -> Result<Self, ControlError> {
        Self::build(AUTHENTICATE, vec![credential_hex.expose().to_owned()], 1)
    }

    /// `GETINFO <key>`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidArgument`] if `key` contains a line
    /// break.
    pub fn get_info(key: &str) -> Result<Self, ControlError> {
        Self::build(GETINFO, vec![key.to_owned()], 0)
    }

    /// `ADD_ONION <key> Port=<virtual>,<target>`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidArgument`] if the key or target contains
    /// a line break.
    pub fn add_onion(request: &AddOnionRequest) -> Result<Self, ControlError> {
        let secret = usize::from(matches!(request.key, KeySpec::Provided(_)));
        Self::build(
            ADD_ONION,
            vec![request.key.argument(), request.mapping.argument()],
            secret,
        )
    }

    /// `DEL_ONION <service_id>`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidArgument`] if `service_id` contains a
    /// line break.
    pub fn del_onion(service_id: &str) -> Result<Self, ControlError> {
        Self::build(DEL_ONION, vec![service_id.to_owned()], 0)
    }

    fn build(
        keyword: &'static str,
        arguments: Vec<String>,
        secret_arguments: usize,
    ) -> Result<Self, ControlError> {
        if arguments
            .iter()
            .any(|argument| argument.contains(['\r', '\n']))
        {
            return Err(ControlError::InvalidArgument { keyword });
        }
        Ok(Self {
            keyword,
            arguments,
            secret_arguments,
        })
    }

    /// Command keyword.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        self.keyword
    }

    /// Arguments in wire order, secrets included.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Wire form: keyword and arguments separated by spaces, CRLF terminated.
    #[must_use]
    pub fn line(&self) -> String {
        let mut line = String::from(self.keyword);
        for argument in &self.arguments {
            line.push(' ');
            line.push_str(argument);
        }
        line.push_str("\r\n");
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.keyword)?;
        for (index, argument) in self.arguments.iter().enumerate() {
            let shown = if index < self.secret_arguments {
                REDACTED
            } else {
                argument.as_str()
            };
            write!(formatter, " {shown}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Command({self})")
    }
}

/// Key selection for a new service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// Ask the daemon to generate a fresh key.
    New,
    /// Use caller-supplied key material.
    Provided(SecretString),
}

impl KeySpec {
    fn argument(&self) -> String {
        match self {
            Self::New => NEW_KEY_ARGUMENT.to_owned(),
            Self::Provided(key) if key.expose().contains(':') => key.expose().to_owned(),
            Self::Provided(key) => format!("{DEFAULT_KEY_TYPE}:{}", key.expose()),
        }
    }
}

/// Virtual port to local target mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Port on the published address.
    pub virtual_port: u16,
    /// Local address receiving forwarded connections.
    pub target_address: String,
    /// Local port receiving forwarded connections.
    pub target_port: u16,
}

impl PortMapping {
    fn argument(&self) -> String {
        if self.target_address.contains(':') {
            format!(
                "Port={},[{}]:{}",
                self.virtual_port, self.target_address, self.target_port
            )
        } else {
            format!(
                "Port={},{}:{}",
                self.virtual_port, self.target_address, self.target_port
            )
        }
    }
}

/// Parameters of an `ADD_ONION` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOnionRequest {
    /// Key selection.
    pub key: KeySpec,
    /// Forwarded port.
    pub mapping: PortMapping,
}

impl AddOnionRequest {
    /// Derives the request from the service settings.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::MissingProvidedKey`] when provided-key
    /// persistence is selected without key material.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ControlError> {
        let key = match config.persistence {
            PersistenceMode::Ephemeral => KeySpec::New,
            PersistenceMode::ProvidedKey => config
                .provided_key
                .clone()
                .filter(|key| !key.is_empty())
                .map(KeySpec::Provided)
                .ok_or(ControlError::MissingProvidedKey)?,
        };
        Ok(Self {
            key,
            mapping: PortMapping {
                virtual_port: config.virtual_port,
                target_address: config.local_bind_address.clone(),
                target_port: config.local_port,
            },
        })
    }
}

/// Interpreted `ADD_ONION` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOnionReply {
    /// Identifier of the created service.
    pub service_id: String,
    /// Generated key, present only when the daemon created one.
    pub private_key: Option<SecretString>,
}

impl AddOnionReply {
    /// Extracts the service identifier and any generated key.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::MissingServiceId`] when no non-empty
    /// `ServiceID=` entry is present.
    pub fn parse(reply: &ReplyBlock, key: &KeySpec) -> Result<Self, ControlError> {
        let service_id = reply
            .value(SERVICE_ID_KEY)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ControlError::MissingServiceId)?;
        let private_key = match key {
            KeySpec::New => reply
                .value(PRIVATE_KEY_KEY)
                .filter(|value| !value.is_empty())
                .map(SecretString::from),
            KeySpec::Provided(_) => None,
        };
        Ok(Self {
            service_id: service_id.to_owned(),
            private_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn request(key: KeySpec) -> AddOnionRequest {
        AddOnionRequest {
            key,
            mapping: PortMapping {
                virtual_port: 12345,
                target_address: String::from("127.0.0.1"),
                target_port: 5000,
            },
        }
    }

    #[test]
    fn ephemeral_request_asks_for_a_new_key() {
        let command = Command::add_onion(&request(KeySpec::New)).expect("valid command");
        assert_eq!(
            command.line(),
            "ADD_ONION NEW:ED25519-V3 Port=12345,127.0.0.1:5000\r\n"
        );
    }

    #[rstest]
    #[case("a2V5", "ADD_ONION ED25519-V3:a2V5 Port=12345,127.0.0.1:5000\r\n")]
    #[case("RSA1024:a2V5", "ADD_ONION RSA1024:a2V5 Port=12345,127.0.0.1:5000\r\n")]
    fn provided_keys_gain_a_type_prefix_when_missing(#[case] key: &str, #[case] expected: &str) {
        let command =
            Command::add_onion(&request(KeySpec::Provided(SecretString::from(key)))).expect("valid");
        assert_eq!(command.line(), expected);
        assert!(!command.to_string().contains("a2V5"));
    }

    #[test]
    fn authenticate_display_hides_the_credential() {
        let command =
            Command::authenticate(&SecretString::from("0102")).expect("valid command");
        assert_eq!(command.line(), "AUTHENTICATE 0102\r\n");
        assert_eq!(command.to_string(), "AUTHENTICATE <redacted>");
        assert_eq!(format!("{command:?}"), "Command(AUTHENTICATE <redacted>)");
    }

    #[test]
    fn line_breaks_in_arguments_are_rejected() {
        let error = Command::del_onion("abc\r\nSIGNAL HALT").expect_err("injection rejected");
        assert!(matches!(
            error,
            ControlError::InvalidArgument { keyword: "DEL_ONION" }
        ));
    }

    #[test]
    fn ipv6_targets_are_bracketed() {
        let mut ipv6 = request(KeySpec::New);
        ipv6.mapping.target_address = String::from("::1");
        let command = Command::add_onion(&ipv6).expect("valid command");
        assert!(command.line().contains("Port=12345,[::1]:5000"));
    }

    #[test]
    fn provided_key_mode_without_key_fails() {
        let config = ServiceConfig {
            persistence: PersistenceMode::ProvidedKey,
            ..ServiceConfig::default()
        };
        let error = AddOnionRequest::from_config(&config).expect_err("missing key");
        assert!(matches!(error, ControlError::MissingProvidedKey));
    }

    #[test]
    fn reply_parsing_extracts_identifier_and_generated_key() {
        let reply = ReplyBlock::from_lines([
            "250-ServiceID=abcdef",
            "250-PrivateKey=ED25519-V3:c2VjcmV0",
            "250 OK",
        ])
        .expect("final line");
        let parsed = AddOnionReply::parse(&reply, &KeySpec::New).expect("service id");
        assert_eq!(parsed.service_id, "abcdef");
        assert_eq!(
            parsed.private_key.as_ref().map(SecretString::expose),
            Some("ED25519-V3:c2VjcmV0")
        );
    }

    #[test]
    fn reply_without_identifier_is_rejected() {
        let reply = ReplyBlock::from_lines(["250 OK"]).expect("final line");
        let error = AddOnionReply::parse(&reply, &KeySpec::New).expect_err("no id");
        assert!(matches!(error, ControlError::MissingServiceId));
    }
}
