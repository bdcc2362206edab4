//! Deterministic identifiers for stub mode.

use sha2::{Digest, Sha256};

use crate::encoding::hex_lower;

const STUB_ID_BYTES: usize = 8;

/// Derives the stub-mode service identifier for a port mapping.
///
/// The identifier is the first eight bytes of the SHA-256 digest of
/// `bind_address|local_port|virtual_port`, rendered as sixteen lowercase hex
/// digits. The same mapping always produces the same identifier and
/// mappings that differ in any field produce different ones.
#[must_use]
pub fn stub_service_id(bind_address: &str, local_port: u16, virtual_port: u16) -> String {
    let digest = Sha256::digest(format!("{bind_address}|{local_port}|{virtual_port}"));
    let prefix = digest.get(..STUB_ID_BYTES).unwrap_or(&[]);
    hex_lower(prefix)
}
