//! Published onion addresses.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Suffix carried by every published address.
pub const ONION_SUFFIX: &str = ".onion";

const V3_SERVICE_ID_LEN: usize = 56;

/// Reasons an address or service identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// The text does not end in [`ONION_SUFFIX`].
    #[error("address '{0}' does not end in .onion")]
    MissingSuffix(String),
    /// The service identifier is empty.
    #[error("service identifier is empty")]
    EmptyServiceId,
    /// The service identifier contains characters outside `[a-z0-9]`.
    #[error("service identifier '{0}' contains invalid characters")]
    InvalidCharacter(String),
    /// The service identifier is not 56 characters of base32.
    #[error("service identifier '{0}' is not a version 3 identifier")]
    NotVersion3(String),
}

/// A published address of the form `<service_id>.onion`.
///
/// The service identifier is always non-empty and lowercase alphanumeric, so
/// [`OnionAddress::service_id`] round-trips through
/// [`OnionAddress::from_service_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OnionAddress(String);

impl OnionAddress {
    /// Builds the address for `service_id`.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] when the identifier is empty or contains
    /// anything other than lowercase ASCII letters and digits.
    pub fn from_service_id(service_id: &str) -> Result<Self, AddressError> {
        validate_service_id(service_id)?;
        Ok(Self(format!("{service_id}{ONION_SUFFIX}")))
    }

    /// Returns the identifier without the suffix.
    #[must_use]
    pub fn service_id(&self) -> &str {
        self.0.strip_suffix(ONION_SUFFIX).unwrap_or(&self.0)
    }

    /// Returns the full address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OnionAddress {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let service_id = value
            .strip_suffix(ONION_SUFFIX)
            .ok_or_else(|| AddressError::MissingSuffix(value.to_owned()))?;
        Self::from_service_id(service_id)
    }
}

impl fmt::Display for OnionAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for OnionAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns `true` when `service_id` has the shape of a version 3 identifier:
/// 56 characters of lowercase base32.
#[must_use]
pub fn is_v3_service_id(service_id: &str) -> bool {
    service_id.len() == V3_SERVICE_ID_LEN
        && service_id
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || (b'2'..=b'7').contains(&byte))
}

fn validate_service_id(service_id: &str) -> Result<(), AddressError> {
    if service_id.is_empty() {
        return Err(AddressError::EmptyServiceId);
    }
    if !service_id
        .bytes()
        .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit())
    {
        return Err(AddressError::InvalidCharacter(service_id.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const V3_ID: &str = "pg6mmjiyjmcrsslvykfwnntlaru7p5svn6y2ymmju6nubxndf4pscryd";

    #[test]
    fn service_id_round_trips() {
        let address = OnionAddress::from_service_id("abcdef0123456789").expect("valid id");
        assert_eq!(address.as_str(), "abcdef0123456789.onion");
        assert_eq!(address.service_id(), "abcdef0123456789");
        let reparsed: OnionAddress = address.as_str().parse().expect("parse address");
        assert_eq!(reparsed, address);
    }

    #[rstest]
    #[case("", AddressError::EmptyServiceId)]
    #[case("abc.def", AddressError::InvalidCharacter(String::from("abc.def")))]
    #[case("ABC", AddressError::InvalidCharacter(String::from("ABC")))]
    fn bad_identifiers_are_rejected(#[case] id: &str, #[case] expected: AddressError) {
        assert_eq!(OnionAddress::from_service_id(id), Err(expected));
    }

    #[test]
    fn parsing_requires_the_suffix() {
        assert_eq!(
            "example.com".parse::<OnionAddress>(),
            Err(AddressError::MissingSuffix(String::from("example.com")))
        );
    }

    #[rstest]
    #[case(V3_ID, true)]
    #[case("abcdef0123456789", false)]
    #[case("1g6mmjiyjmcrsslvykfwnntlaru7p5svn6y2ymmju6nubxndf4pscryd", false)]
    fn v3_shape_is_recognised(#[case] id: &str, #[case] expected: bool) {
        assert_eq!(is_v3_service_id(id), expected);
    }
}
