//! Secret-bearing strings that never print their contents.

use std::fmt;

/// Placeholder rendered in place of secret material.
pub const REDACTED: &str = "<redacted>";

/// Returns `value`, or [`REDACTED`] when `enabled` is set.
#[must_use]
pub const fn redact(value: &str, enabled: bool) -> &str {
    if enabled { REDACTED } else { value }
}

/// Owned string whose `Debug` and `Display` output is always [`REDACTED`].
///
/// Key material and cookie hex pass through the client as `SecretString`
/// so that logging a containing struct cannot leak them.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SecretString(String);

impl SecretString {
    /// Wraps `value`.
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns the secret text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` when the secret holds no text.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(REDACTED)
    }
}
