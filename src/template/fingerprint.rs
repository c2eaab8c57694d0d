//! Template content digests.
//!
//! The fingerprint identifies a template's content independently of key
//! order or whitespace in the JSON it was loaded from: the template is
//! serialized to canonical JSON (RFC 8785) and hashed with SHA-256. Its
//! prefix becomes the middle segment of public layergroup ids, so editing a
//! template changes every id minted from it afterwards.

use sha2::{Digest, Sha256};

use super::Template;
use crate::constants::FINGERPRINT_PREFIX_LEN;
use crate::core::{MapsError, Result};

/// Lowercase hex SHA-256 digest of the template's canonical JSON.
///
/// # Errors
///
/// [`MapsError::Json`] if the template cannot be canonicalized.
pub fn fingerprint(template: &Template) -> Result<String> {
    let canonical = serde_json::to_value(template)
        .and_then(|value| serde_jcs::to_vec(&value))
        .map_err(MapsError::from)?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// The first eight hex characters of [`fingerprint`].
///
/// # Errors
///
/// See [`fingerprint`].
pub fn fingerprint_prefix(template: &Template) -> Result<String> {
    let mut digest = fingerprint(template)?;
    digest.truncate(FINGERPRINT_PREFIX_LEN);
    Ok(digest)
}
