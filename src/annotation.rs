use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::{error::AnnotationError, hash::HashType, signer::Signer};

/// Trust dimension an annotation speaks to.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
pub enum AnnotationType {
    /// Whether the data came from an automated source rather than manual entry
    #[serde(rename = "automation")]
    #[strum(serialize = "automation")]
    Automation,
    /// Whether the host keeps its secrets in a trusted platform module
    #[serde(rename = "tpm")]
    #[strum(serialize = "tpm")]
    Tpm,
}

/// A signed trust verdict about one payload.
///
/// Annotations produced by this crate are always signed: the only local
/// constructor is [`AnnotationBuilder::sign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Content-derived identity of the evaluated payload
    pub key: String,
    /// Hash used to derive `key`
    #[serde(rename = "hash")]
    pub hash_type: HashType,
    /// Host that performed the evaluation
    pub host: String,
    /// Trust dimension
    pub kind: AnnotationType,
    /// Hex encoded signature over every other field
    pub signature: String,
    /// The evaluator's verdict
    #[serde(rename = "isSatisfied")]
    pub satisfied: bool,
}

/// Fields covered by the signature, in their wire names.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedFields<'a> {
    key: &'a str,
    hash: HashType,
    host: &'a str,
    kind: AnnotationType,
    is_satisfied: bool,
}

impl SignedFields<'_> {
    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_jcs::to_string(self)?.into_bytes())
    }
}

impl Annotation {
    /// Checks the signature against the public half of the signing credential.
    pub fn verify(&self, verifier: &dyn Signer) -> Result<()> {
        let signature = hex::decode(&self.signature)
            .map_err(|e| anyhow!("Annotation signature is not hex encoded: {e}"))?;
        let data = SignedFields {
            key: &self.key,
            hash: self.hash_type,
            host: &self.host,
            kind: self.kind,
            is_satisfied: self.satisfied,
        }
        .canonical_bytes()?;
        verifier.verify(&data, &signature)
    }
}

/// An annotation that has been evaluated but not yet signed.
///
/// Never leaves the annotator that builds it; [`AnnotationBuilder::sign`]
/// consumes it.
#[derive(Debug, Clone)]
pub struct AnnotationBuilder {
    key: String,
    hash_type: HashType,
    host: String,
    kind: AnnotationType,
    satisfied: bool,
}

impl AnnotationBuilder {
    /// Collects the fields of a new annotation.
    pub fn new(
        key: String,
        hash_type: HashType,
        host: String,
        kind: AnnotationType,
        satisfied: bool,
    ) -> Self {
        Self {
            key,
            hash_type,
            host,
            kind,
            satisfied,
        }
    }

    /// Signs the collected fields and returns the finished annotation.
    ///
    /// On failure the builder is dropped, so no unsigned annotation escapes.
    pub async fn sign(self, signer: &dyn Signer) -> Result<Annotation> {
        let data = SignedFields {
            key: &self.key,
            hash: self.hash_type,
            host: &self.host,
            kind: self.kind,
            is_satisfied: self.satisfied,
        }
        .canonical_bytes()?;

        let signature = signer.sign(&data).await.map_err(into_signing_error)?;

        Ok(Annotation {
            key: self.key,
            hash_type: self.hash_type,
            host: self.host,
            kind: self.kind,
            signature: hex::encode(signature),
            satisfied: self.satisfied,
        })
    }
}

fn into_signing_error(e: anyhow::Error) -> anyhow::Error {
    match e.downcast_ref::<AnnotationError>() {
        Some(AnnotationError::Signing(_)) => e,
        _ => AnnotationError::Signing(format!("{e:#}")).into(),
    }
}

/// A batch of annotations published together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationList {
    /// Annotations in annotator order
    pub items: Vec<Annotation>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::signer::{Ed25519Signer, SignerType};

    fn builder(satisfied: bool) -> AnnotationBuilder {
        AnnotationBuilder::new(
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9".to_owned(),
            HashType::Sha256,
            "edge-gateway-01".to_owned(),
            AnnotationType::Automation,
            satisfied,
        )
    }

    #[tokio::test]
    async fn signed_annotation_verifies() {
        let signer = SignerType::ED25519(Ed25519Signer::create().unwrap());
        let annotation = builder(true).sign(&signer).await.unwrap();

        assert!(!annotation.signature.is_empty());
        assert_eq!(annotation.signature.len(), 128);
        assert!(annotation.verify(&signer).is_ok());
    }

    #[tokio::test]
    async fn tampered_annotation_fails_verification() {
        let signer = SignerType::ED25519(Ed25519Signer::create().unwrap());
        let mut annotation = builder(false).sign(&signer).await.unwrap();

        annotation.satisfied = true;
        assert!(annotation.verify(&signer).is_err());
    }

    #[tokio::test]
    async fn other_key_fails_verification() {
        let signer = SignerType::ED25519(Ed25519Signer::create().unwrap());
        let other = SignerType::ED25519(Ed25519Signer::create().unwrap());
        let annotation = builder(false).sign(&signer).await.unwrap();

        assert!(annotation.verify(&other).is_err());
    }

    #[tokio::test]
    async fn signing_failure_yields_no_annotation() {
        let signer = Ed25519Signer::create().unwrap();
        let verify_only = Ed25519Signer::from_public_key(&signer.public_key()).unwrap();

        let err = builder(true).sign(&verify_only).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnnotationError>(),
            Some(AnnotationError::Signing(_))
        ));
    }

    #[tokio::test]
    async fn wire_field_names() {
        let signer = SignerType::ED25519(Ed25519Signer::create().unwrap());
        let annotation = builder(true).sign(&signer).await.unwrap();

        let value = serde_json::to_value(&annotation).unwrap();
        assert_eq!(value["hash"], json!("sha256"));
        assert_eq!(value["kind"], json!("automation"));
        assert_eq!(value["isSatisfied"], json!(true));
        assert_eq!(value["host"], json!("edge-gateway-01"));

        let parsed: Annotation = serde_json::from_value(value).unwrap();
        assert!(parsed.verify(&signer).is_ok());
    }
}
