//! Library for annotating telemetry with signed provenance records.
//!
//! Annotators inspect payload bytes, decide a trust predicate, and emit
//! signed annotations keyed by a content-derived hash. Stream providers
//! relay batches of annotations to downstream consumers.

/// Signed annotation records
pub mod annotation;

/// Payload evaluators (automation, TPM)
pub mod annotator;

/// Configuration loading
pub mod config;

/// Error taxonomy
pub mod error;

/// Content-derived annotation keys
pub mod hash;

/// Publish envelope
pub mod message;

/// Annotate-and-publish facade
pub mod sdk;

/// Digital signature implementations (ed25519, p256)
pub mod signer;

/// Publish transports (MQTT, in-memory)
pub mod stream;
