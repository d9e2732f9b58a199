use anyhow::{anyhow, Result};
use async_trait::async_trait;
use did_key::{CoreSign, Ed25519KeyPair, Generate, KeyMaterial};

use crate::{error::AnnotationError, signer::Signer};

const SECRET_KEY_LEN: usize = 32;
const PUBLIC_KEY_LEN: usize = 32;

/// Represents a signer that uses an Ed25519 key pair for signing.
///
/// A signer built from a public key alone can verify but not sign.
#[derive(Debug, PartialEq, Clone)]
pub struct Ed25519Signer {
    secret_key: Option<Vec<u8>>,
    public_key: Vec<u8>,
}

impl Ed25519Signer {
    /// Creates a new Ed25519Signer instance with a randomly generated key pair.
    pub fn create() -> Result<Self> {
        let key_pair = Ed25519KeyPair::new();
        Ok(Ed25519Signer {
            secret_key: Some(key_pair.private_key_bytes()),
            public_key: key_pair.public_key_bytes(),
        })
    }

    /// Imports an Ed25519Signer instance from a given secret key.
    ///
    /// # Arguments
    ///
    /// * `secret_key` - The 32-byte seed, or the 64-byte seed||public form.
    ///
    /// # Returns
    ///
    /// A new `Ed25519Signer`, or [`AnnotationError::InvalidKey`] for any other length
    /// or when the public half of the 64-byte form does not belong to the seed.
    pub fn import(secret_key: &[u8]) -> Result<Self> {
        let (seed, expected_public) = match secret_key.len() {
            SECRET_KEY_LEN => (secret_key, None),
            n if n == SECRET_KEY_LEN + PUBLIC_KEY_LEN => {
                let (seed, public) = secret_key.split_at(SECRET_KEY_LEN);
                (seed, Some(public))
            }
            n => {
                return Err(AnnotationError::InvalidKey(format!(
                    "ed25519 secret key must be 32 or 64 bytes, got {n}"
                ))
                .into())
            }
        };
        let key_pair = Ed25519KeyPair::from_secret_key(seed);
        if let Some(public) = expected_public {
            if public != key_pair.public_key_bytes().as_slice() {
                return Err(AnnotationError::InvalidKey(
                    "ed25519 public half does not match the seed".into(),
                )
                .into());
            }
        }
        Ok(Ed25519Signer {
            secret_key: Some(seed.to_vec()),
            public_key: key_pair.public_key_bytes(),
        })
    }

    /// Builds a verify-only signer from a 32-byte public key.
    pub fn from_public_key(public_key: &[u8]) -> Result<Self> {
        if public_key.len() != PUBLIC_KEY_LEN {
            return Err(AnnotationError::InvalidKey(format!(
                "ed25519 public key must be 32 bytes, got {}",
                public_key.len()
            ))
            .into());
        }
        Ok(Ed25519Signer {
            secret_key: None,
            public_key: public_key.to_vec(),
        })
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    async fn sign(&self, data: &[u8]) -> Result<[u8; 64]> {
        log::trace!("Signing data with Ed25519 key");
        let secret_key = self
            .secret_key
            .as_ref()
            .ok_or_else(|| AnnotationError::Signing("ed25519 signer has no secret key".into()))?;
        let keypair = Ed25519KeyPair::from_secret_key(secret_key);
        let sig = keypair.sign(data);
        let sig_array = sig
            .try_into()
            .map_err(|_| anyhow!("Signature must be 64 bytes"))?;
        Ok(sig_array)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() != 64 {
            return Err(anyhow!(
                "ed25519 signature must be 64 bytes, got {}",
                signature.len()
            ));
        }
        let keypair = Ed25519KeyPair::from_public_key(&self.public_key);
        keypair
            .verify(data, signature)
            .map_err(|e| anyhow!("ed25519 signature verification failed: {e:?}"))
    }

    fn public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }
}
