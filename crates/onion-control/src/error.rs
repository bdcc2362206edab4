//! Error type shared by every layer of the control client.

use std::fmt;
use std::io;

use onion_config::AuthMode;
use thiserror::Error;

use crate::address::AddressError;

/// Coarse grouping of [`ControlError`] variants.
///
/// The CLI maps categories to exit statuses and diagnostics labels, so
/// callers rarely need to match individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The daemon could not be reached or the connection dropped.
    Connectivity,
    /// The daemon sent something the client could not interpret.
    Protocol,
    /// Credentials were unavailable or refused.
    Authentication,
    /// A lifecycle step was refused or did not complete in time.
    Lifecycle,
    /// The caller misused the API or supplied unusable input.
    Usage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connectivity => "connectivity",
            Self::Protocol => "protocol",
            Self::Authentication => "authentication",
            Self::Lifecycle => "lifecycle",
            Self::Usage => "usage",
        };
        formatter.write_str(label)
    }
}

/// Failures raised while talking to the control port.
///
/// Secrets never appear in the rendered messages: commands are rendered
/// redacted and cookie paths are masked when redaction is enabled.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The control endpoint did not resolve to any socket address.
    #[error("failed to resolve control endpoint {endpoint}: {source}")]
    Resolve {
        /// Endpoint as configured.
        endpoint: String,
        /// Underlying resolver failure.
        #[source]
        source: io::Error,
    },
    /// The TCP connection could not be established.
    #[error("failed to connect to control endpoint {endpoint}: {source}")]
    Connect {
        /// Endpoint as configured.
        endpoint: String,
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
    /// Writing a command failed.
    #[error("failed to send {keyword} command: {source}")]
    Send {
        /// Keyword of the command being written.
        keyword: &'static str,
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
    /// Reading a reply failed.
    #[error("failed to read reply to {keyword}: {source}")]
    Receive {
        /// Keyword of the command awaiting a reply.
        keyword: &'static str,
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
    /// Closing the connection failed.
    #[error("failed to close control connection: {source}")]
    Close {
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
    /// The daemon closed the stream before a reply was complete.
    #[error("control connection closed mid-reply ({pending_lines} lines pending)")]
    UnexpectedEof {
        /// Complete lines buffered for the unfinished reply.
        pending_lines: usize,
    },
    /// A reply line grew past the framing limit without a terminator.
    #[error("reply line exceeds {limit} bytes")]
    LineTooLong {
        /// Maximum accepted line length.
        limit: usize,
    },
    /// A reply could not be assembled from the supplied lines.
    #[error("malformed reply: {line}")]
    MalformedReply {
        /// Offending line.
        line: String,
    },
    /// The channel was closed or broken by an earlier failure.
    #[error("control connection is closed")]
    ChannelClosed,
    /// A step that needs a connection ran without one.
    #[error("not connected to the control port")]
    NotConnected,
    /// A step that needs an authenticated session ran before authentication.
    #[error("control session is not authenticated")]
    NotAuthenticated,
    /// A command argument would break the line framing.
    #[error("{keyword} argument contains a line break")]
    InvalidArgument {
        /// Keyword of the rejected command.
        keyword: &'static str,
    },
    /// The configured authentication mode is not implemented.
    #[error("authentication mode '{mode}' is not supported")]
    AuthenticationUnsupported {
        /// Requested mode.
        mode: AuthMode,
    },
    /// The cookie file could not be read.
    #[error("failed to read authentication cookie {path}: {source}")]
    CookieRead {
        /// Cookie path, masked when redaction is enabled.
        path: String,
        /// Underlying filesystem failure.
        #[source]
        source: io::Error,
    },
    /// The cookie file exists but holds no bytes.
    #[error("authentication cookie {path} is empty")]
    CookieEmpty {
        /// Cookie path, masked when redaction is enabled.
        path: String,
    },
    /// The daemon refused the credentials.
    #[error("authentication rejected: {reply}")]
    AuthenticationRejected {
        /// Final reply line.
        reply: String,
    },
    /// The bootstrap status query was refused.
    #[error("bootstrap status query rejected: {reply}")]
    BootstrapQueryRejected {
        /// Final reply line.
        reply: String,
    },
    /// The daemon did not finish bootstrapping within the configured window.
    #[error("daemon did not finish bootstrapping within {timeout_ms} ms")]
    BootstrapTimeout {
        /// Configured timeout.
        timeout_ms: u128,
    },
    /// Provided-key persistence was selected without a key.
    #[error("provided-key persistence requires a provided key")]
    MissingProvidedKey,
    /// The daemon refused to create the service.
    #[error("service creation rejected: {reply}")]
    CreateRejected {
        /// Final reply line.
        reply: String,
    },
    /// The creation reply carried no service identifier.
    #[error("service creation reply carried no service identifier")]
    MissingServiceId,
    /// The creation reply carried an unusable service identifier.
    #[error("service creation reply carried an invalid identifier: {source}")]
    InvalidServiceId {
        /// Why the identifier was rejected.
        #[source]
        source: AddressError,
    },
    /// The daemon refused to remove the service.
    #[error("service removal rejected: {reply}")]
    RemoveRejected {
        /// Final reply line.
        reply: String,
    },
    /// Teardown after a round trip left warnings behind.
    #[error("teardown incomplete: {warnings}")]
    TeardownIncomplete {
        /// Joined teardown warnings.
        warnings: String,
    },
}

impl ControlError {
    /// Returns the category the error belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Resolve { .. }
            | Self::Connect { .. }
            | Self::Close { .. }
            | Self::ChannelClosed => ErrorCategory::Connectivity,
            Self::Send { .. }
            | Self::Receive { .. }
            | Self::UnexpectedEof { .. }
            | Self::LineTooLong { .. }
            | Self::MalformedReply { .. }
            | Self::BootstrapQueryRejected { .. } => ErrorCategory::Protocol,
            Self::AuthenticationUnsupported { .. }
            | Self::CookieRead { .. }
            | Self::CookieEmpty { .. }
            | Self::AuthenticationRejected { .. } => ErrorCategory::Authentication,
            Self::BootstrapTimeout { .. }
            | Self::MissingProvidedKey
            | Self::CreateRejected { .. }
            | Self::MissingServiceId
            | Self::InvalidServiceId { .. }
            | Self::RemoveRejected { .. }
            | Self::TeardownIncomplete { .. } => ErrorCategory::Lifecycle,
            Self::NotConnected | Self::NotAuthenticated | Self::InvalidArgument { .. } => {
                ErrorCategory::Usage
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::refused(
        ControlError::Connect {
            endpoint: String::from("127.0.0.1:9051"),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        },
        ErrorCategory::Connectivity
    )]
    #[case::eof(ControlError::UnexpectedEof { pending_lines: 1 }, ErrorCategory::Protocol)]
    #[case::cookie(
        ControlError::CookieEmpty { path: String::from("<redacted>") },
        ErrorCategory::Authentication
    )]
    #[case::timeout(ControlError::BootstrapTimeout { timeout_ms: 10 }, ErrorCategory::Lifecycle)]
    #[case::usage(ControlError::NotConnected, ErrorCategory::Usage)]
    fn errors_map_to_categories(#[case] error: ControlError, #[case] expected: ErrorCategory) {
        assert_eq!(error.category(), expected);
    }

    #[test]
    fn unsupported_mode_names_the_mode() {
        let error = ControlError::AuthenticationUnsupported {
            mode: AuthMode::Password,
        };
        assert_eq!(
            error.to_string(),
            "authentication mode 'password' is not supported"
        );
    }
}
