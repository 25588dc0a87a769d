//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique row id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Derives the opaque donor identifier stored in place of any real-world identity.
///
/// The identity is trimmed and upper-cased first so the same document number
/// typed two ways lands on the same donor.
pub fn donor_hash_id(identity: &str, salt: &str) -> String {
    let normalised = identity.trim().to_uppercase();
    sha256::digest(format!("{salt}:{normalised}"))
}
