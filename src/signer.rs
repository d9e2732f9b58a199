/// Ed25519 elliptic curve signer
pub mod ed25519_signer;
/// P-256 (secp256r1) elliptic curve signer
pub mod p256_signer;

use std::{fs, path::Path};

use anyhow::Result;
use async_trait::async_trait;
pub use ed25519_signer::*;
pub use p256_signer::*;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    config::{KeyInfo, SignatureInfo},
    error::AnnotationError,
};

/// Supported cryptographic key types for signing operations.
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
pub enum KeyType {
    /// secp256r1/P-256 elliptic curve (NIST standard)
    #[serde(rename = "secp256r1", alias = "p256")]
    #[strum(serialize = "secp256r1")]
    SECP256R1,
    /// Ed25519 elliptic curve (EdDSA)
    #[serde(rename = "ed25519")]
    #[strum(serialize = "ed25519")]
    ED25519,
}

/// Enum representing all supported signer implementations.
#[derive(Debug, Clone, Display)]
pub enum SignerType {
    /// Ed25519 local signer
    #[strum(serialize = "ed25519")]
    ED25519(Ed25519Signer),
    /// P-256 local signer
    #[strum(serialize = "p256")]
    P256(P256Signer),
}

impl SignerType {
    /// Returns the key type backing this signer.
    pub fn key_type(&self) -> KeyType {
        match self {
            SignerType::ED25519(_) => KeyType::ED25519,
            SignerType::P256(_) => KeyType::SECP256R1,
        }
    }
}

/// Trait for cryptographic signing operations.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs the provided data and returns a 64-byte signature.
    ///
    /// # Arguments
    ///
    /// * `data` - The data to sign.
    ///
    /// # Returns
    ///
    /// A 64-byte signature array.
    async fn sign(&self, data: &[u8]) -> Result<[u8; 64]>;

    /// Checks `signature` over `data` against this signer's public key.
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()>;

    /// Returns the raw public key bytes.
    fn public_key(&self) -> Vec<u8>;
}

#[async_trait]
impl Signer for SignerType {
    async fn sign(&self, data: &[u8]) -> Result<[u8; 64]> {
        match self {
            SignerType::ED25519(signer) => signer.sign(data).await,
            SignerType::P256(signer) => signer.sign(data).await,
        }
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        match self {
            SignerType::ED25519(signer) => signer.verify(data, signature),
            SignerType::P256(signer) => signer.verify(data, signature),
        }
    }

    fn public_key(&self) -> Vec<u8> {
        match self {
            SignerType::ED25519(signer) => signer.public_key(),
            SignerType::P256(signer) => signer.public_key(),
        }
    }
}

/// Loads the signing credential named by the private half of `info`.
///
/// The key file holds the hex encoded secret key; surrounding whitespace is ignored.
pub fn load_signer(info: &SignatureInfo) -> Result<SignerType> {
    let secret_key = read_key_file(&info.private_key)?;
    let signer = match info.private_key.key_type {
        KeyType::ED25519 => SignerType::ED25519(Ed25519Signer::import(&secret_key)?),
        KeyType::SECP256R1 => SignerType::P256(P256Signer::import(&secret_key)?),
    };
    log::debug!(
        "Loaded {} signer from {}",
        signer,
        info.private_key.path.display()
    );
    Ok(signer)
}

/// Loads a verify-only signer from the public half of `info`.
pub fn load_verifier(info: &SignatureInfo) -> Result<SignerType> {
    let public_key = read_key_file(&info.public_key)?;
    let verifier = match info.public_key.key_type {
        KeyType::ED25519 => SignerType::ED25519(Ed25519Signer::from_public_key(&public_key)?),
        KeyType::SECP256R1 => SignerType::P256(P256Signer::from_public_key(&public_key)?),
    };
    Ok(verifier)
}

fn read_key_file(key: &KeyInfo) -> Result<Vec<u8>> {
    let path: &Path = &key.path;
    let contents = fs::read_to_string(path).map_err(|e| {
        AnnotationError::InvalidKey(format!("failed to read {}: {e}", path.display()))
    })?;
    let bytes = hex::decode(contents.trim()).map_err(|e| {
        AnnotationError::InvalidKey(format!("{} is not hex encoded: {e}", path.display()))
    })?;
    Ok(bytes)
}
