use thiserror::Error;

/// Failure classes surfaced by annotation and publishing.
///
/// These are raised inside an [`anyhow::Error`]; use
/// `err.downcast_ref::<AnnotationError>()` to branch on the class.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// The payload matched none of the record shapes an annotator knows.
    #[error("payload matches no known record shape: {0}")]
    MalformedPayload(String),
    /// The content-derived key could not be computed.
    #[error("failed to derive {kind} hash: {reason}")]
    HashDerivation {
        /// Hash algorithm that was requested
        kind: String,
        /// Underlying cause
        reason: String,
    },
    /// The signing credential rejected the annotation.
    #[error("failed to sign annotation: {0}")]
    Signing(String),
    /// Key material could not be loaded or is unusable.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// The broker connection could not be (re)established.
    #[error("broker connection failed: {0}")]
    Connection(String),
}
