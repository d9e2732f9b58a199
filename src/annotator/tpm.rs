use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    annotation::{Annotation, AnnotationBuilder, AnnotationType},
    annotator::{local_hostname, Annotator},
    hash::{derive_hash, HashType},
    signer::Signer,
};

/// Attests whether the host keeps its secrets in a TPM.
pub struct TpmAnnotator {
    hash_type: HashType,
    signer: Arc<dyn Signer>,
}

impl TpmAnnotator {
    /// Creates an annotator that keys payloads with `hash_type` and signs with `signer`.
    pub fn new(hash_type: HashType, signer: Arc<dyn Signer>) -> Self {
        Self { hash_type, signer }
    }
}

#[async_trait]
impl Annotator for TpmAnnotator {
    fn kind(&self) -> AnnotationType {
        AnnotationType::Tpm
    }

    async fn annotate(&self, data: &[u8]) -> Result<Annotation> {
        let key = derive_hash(self.hash_type, data)?;
        let host = local_hostname();

        // TODO: probe the platform TPM once hardware attestation is wired in.
        let satisfied = false;

        AnnotationBuilder::new(key, self.hash_type, host, self.kind(), satisfied)
            .sign(self.signer.as_ref())
            .await
    }
}
