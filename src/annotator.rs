/// Automated-versus-manual source annotator
pub mod automation;
/// Trusted platform module annotator
pub mod tpm;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
pub use automation::*;
pub use tpm::*;

use crate::{
    annotation::{Annotation, AnnotationType},
    hash::HashType,
    signer::Signer,
};

/// Evaluates one trust dimension of a payload and produces a signed [`Annotation`].
///
/// Implementations hold no per-call state and may be shared across tasks.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// The trust dimension this annotator reports on.
    fn kind(&self) -> AnnotationType;

    /// Annotates `data`.
    ///
    /// # Arguments
    ///
    /// * `data` - The raw payload bytes.
    ///
    /// # Returns
    ///
    /// A signed annotation, or an error with nothing produced.
    async fn annotate(&self, data: &[u8]) -> Result<Annotation>;
}

/// Builds the annotator registered for `kind`.
///
/// # Arguments
///
/// * `kind` - Trust dimension to evaluate.
/// * `hash_type` - Hash used for annotation keys.
/// * `signer` - Signing credential, shared read-only between annotators.
pub fn new_annotator(
    kind: AnnotationType,
    hash_type: HashType,
    signer: Arc<dyn Signer>,
) -> Box<dyn Annotator> {
    match kind {
        AnnotationType::Automation => Box::new(AutomationAnnotator::new(hash_type, signer)),
        AnnotationType::Tpm => Box::new(TpmAnnotator::new(hash_type, signer)),
    }
}

/// Name of the local machine, or an empty string if it cannot be resolved.
pub(crate) fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            log::warn!("Failed to resolve hostname: {e}");
            String::new()
        }
    }
}
