use anyhow::{anyhow, Result};
use async_trait::async_trait;
use did_key::{CoreSign, Generate, KeyMaterial, P256KeyPair};
use p256::{
    ecdsa::{signature::Verifier, Signature, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey, SecretKey,
};

use crate::{error::AnnotationError, signer::Signer};

/// Signer implementation using P-256 (secp256r1) elliptic curve.
#[derive(Debug, PartialEq, Clone)]
pub struct P256Signer {
    secret_key: Option<Vec<u8>>,
    public_key: Vec<u8>,
}

impl P256Signer {
    /// Creates a new P256Signer instance with a randomly generated key pair.
    pub fn create() -> Result<Self> {
        let key_pair = P256KeyPair::new();
        Self::import(&key_pair.private_key_bytes())
    }

    /// Imports a P256Signer instance from a 32-byte secret scalar.
    ///
    /// The scalar must be non-zero and below the curve order.
    pub fn import(secret_key: &[u8]) -> Result<Self> {
        if secret_key.len() != 32 {
            return Err(AnnotationError::InvalidKey(format!(
                "p256 secret key must be 32 bytes, got {}",
                secret_key.len()
            ))
            .into());
        }
        let scalar = SecretKey::from_slice(secret_key)
            .map_err(|e| AnnotationError::InvalidKey(format!("p256 secret key: {e}")))?;
        Ok(P256Signer {
            secret_key: Some(secret_key.to_vec()),
            public_key: encode_public_key(&scalar.public_key()),
        })
    }

    /// Builds a verify-only signer from a SEC1 encoded P-256 public key.
    pub fn from_public_key(public_key: &[u8]) -> Result<Self> {
        let point = PublicKey::from_sec1_bytes(public_key)
            .map_err(|e| AnnotationError::InvalidKey(format!("p256 public key: {e}")))?;
        Ok(P256Signer {
            secret_key: None,
            public_key: encode_public_key(&point),
        })
    }
}

fn encode_public_key(point: &PublicKey) -> Vec<u8> {
    point.to_encoded_point(false).as_bytes().to_vec()
}

#[async_trait]
impl Signer for P256Signer {
    async fn sign(&self, data: &[u8]) -> Result<[u8; 64]> {
        log::trace!("Signing data with P256 key");
        let secret_key = self
            .secret_key
            .as_ref()
            .ok_or_else(|| AnnotationError::Signing("p256 signer has no secret key".into()))?;
        let keypair = P256KeyPair::from_secret_key(secret_key);
        let sig = keypair.sign(data);
        let sig_array = sig
            .try_into()
            .map_err(|_| anyhow!("Signature must be 64 bytes"))?;
        Ok(sig_array)
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let key = VerifyingKey::from_sec1_bytes(&self.public_key)
            .map_err(|e| AnnotationError::InvalidKey(format!("p256 public key: {e}")))?;
        let signature = Signature::from_slice(signature)
            .map_err(|e| anyhow!("p256 signature is malformed: {e}"))?;
        key.verify(data, &signature)
            .map_err(|e| anyhow!("p256 signature verification failed: {e}"))
    }

    fn public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_invalid_key(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<AnnotationError>(),
            Some(AnnotationError::InvalidKey(_))
        )
    }

    #[test]
    fn zero_scalar_is_an_invalid_key() {
        let err = P256Signer::import(&[0u8; 32]).unwrap_err();
        assert!(is_invalid_key(&err), "{err:#}");
    }

    #[test]
    fn scalar_above_curve_order_is_an_invalid_key() {
        let err = P256Signer::import(&[0xffu8; 32]).unwrap_err();
        assert!(is_invalid_key(&err), "{err:#}");
    }

    #[test]
    fn garbage_public_key_is_an_invalid_key() {
        let err = P256Signer::from_public_key(&[1, 2, 3]).unwrap_err();
        assert!(is_invalid_key(&err), "{err:#}");

        let err = P256Signer::from_public_key(&[]).unwrap_err();
        assert!(is_invalid_key(&err), "{err:#}");
    }

    #[tokio::test]
    async fn verify_only_signer_checks_signatures() {
        let signer = P256Signer::create().unwrap();
        let verifier = P256Signer::from_public_key(&signer.public_key()).unwrap();
        assert_eq!(verifier.public_key(), signer.public_key());

        let sig = signer.sign(b"payload").await.unwrap();
        assert!(verifier.verify(b"payload", &sig).is_ok());
        assert!(verifier.verify(b"other payload", &sig).is_err());
        assert!(verifier.verify(b"payload", &sig[..10]).is_err());
        assert!(verifier.verify(b"payload", &[0u8; 64]).is_err());
    }

    #[test]
    fn import_is_deterministic() {
        let a = P256Signer::import(&[7u8; 32]).unwrap();
        let b = P256Signer::import(&[7u8; 32]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.public_key().len(), 65);
    }
}
