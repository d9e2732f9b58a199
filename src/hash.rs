use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AnnotationError;

/// Hash algorithms available for deriving an annotation key from payload bytes.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Debug,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
pub enum HashType {
    /// The payload itself, read as UTF-8, is the key.
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    None,
    /// Hex encoded SHA-256 digest
    #[serde(rename = "sha256")]
    #[strum(serialize = "sha256")]
    Sha256,
    /// Hex encoded BLAKE3 digest
    #[serde(rename = "blake3")]
    #[strum(serialize = "blake3")]
    Blake3,
}

/// Derives the content-addressed key for `data`.
///
/// Identical bytes always produce the same key.
///
/// # Arguments
///
/// * `kind` - The hash algorithm to apply.
/// * `data` - The payload bytes.
///
/// # Returns
///
/// The key string, or an [`AnnotationError::HashDerivation`] if the payload
/// cannot be represented under `kind`.
pub fn derive_hash(kind: HashType, data: &[u8]) -> Result<String> {
    let key = match kind {
        HashType::None => String::from_utf8(data.to_vec()).map_err(|e| {
            AnnotationError::HashDerivation {
                kind: kind.to_string(),
                reason: e.to_string(),
            }
        })?,
        HashType::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        }
        HashType::Blake3 => blake3::hash(data).to_hex().to_string(),
    };

    log::trace!("derived {kind} key {key}");

    Ok(key)
}
