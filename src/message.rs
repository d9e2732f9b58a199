use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type used when the content is an [`AnnotationList`](crate::annotation::AnnotationList).
pub const ANNOTATION_LIST_MESSAGE_TYPE: &str = "AnnotationList";

/// Lifecycle step of the data an annotation batch describes.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SdkAction {
    /// Data was created
    Create,
    /// Data was changed
    Mutate,
    /// Data passed through an intermediary
    Transit,
    /// Data is leaving the pipeline
    Publish,
}

/// Transport-agnostic envelope handed to a stream provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishWrapper {
    /// What happened to the data
    pub action: SdkAction,
    /// Discriminator for the shape of `content`
    pub message_type: String,
    /// The payload, usually an annotation list
    pub content: Value,
}

impl PublishWrapper {
    /// Wraps a serializable payload.
    pub fn new<T: Serialize>(action: SdkAction, message_type: &str, content: &T) -> Result<Self> {
        Ok(Self {
            action,
            message_type: message_type.to_owned(),
            content: serde_json::to_value(content)?,
        })
    }
}
