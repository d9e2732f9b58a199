use std::sync::Arc;

use anyhow::Result;

use crate::{
    annotation::AnnotationList,
    annotator::{new_annotator, Annotator},
    config::SdkInfo,
    message::{PublishWrapper, SdkAction, ANNOTATION_LIST_MESSAGE_TYPE},
    signer::{load_signer, Signer},
    stream::{new_stream_provider, StreamProvider},
};

/// Runs the configured annotators over payloads and publishes the results.
pub struct Sdk {
    annotators: Vec<Box<dyn Annotator>>,
    stream: Box<dyn StreamProvider>,
}

impl Sdk {
    /// Builds the annotators and stream described by `info`.
    ///
    /// The signing key is loaded once and shared by every annotator.
    pub fn new(info: &SdkInfo) -> Result<Self> {
        let stream = new_stream_provider(&info.stream)?;
        Self::with_stream(info, stream)
    }

    /// Like [`Sdk::new`], publishing to `stream` instead of the configured one.
    pub fn with_stream(info: &SdkInfo, stream: Box<dyn StreamProvider>) -> Result<Self> {
        let signer: Arc<dyn Signer> = Arc::new(load_signer(&info.signature)?);
        Ok(Self::from_parts(info, signer, stream))
    }

    /// Assembles an `Sdk` from an already loaded signer.
    pub fn from_parts(
        info: &SdkInfo,
        signer: Arc<dyn Signer>,
        stream: Box<dyn StreamProvider>,
    ) -> Self {
        let annotators = info
            .annotators
            .iter()
            .map(|kind| new_annotator(*kind, info.hash.hash_type, signer.clone()))
            .collect();

        Self { annotators, stream }
    }

    /// Opens the stream.
    pub async fn bootstrap(&self) -> Result<()> {
        self.stream.connect().await
    }

    /// Annotates newly created data and publishes the annotations.
    pub async fn create(&self, data: &[u8]) -> Result<()> {
        self.annotate_and_publish(SdkAction::Create, data).await
    }

    /// Annotates the new version of changed data and publishes the annotations.
    pub async fn mutate(&self, old: &[u8], new: &[u8]) -> Result<()> {
        log::trace!("mutate replaces {} bytes with {}", old.len(), new.len());
        self.annotate_and_publish(SdkAction::Mutate, new).await
    }

    /// Annotates data passing through and publishes the annotations.
    pub async fn transit(&self, data: &[u8]) -> Result<()> {
        self.annotate_and_publish(SdkAction::Transit, data).await
    }

    /// Annotates data on its way out and publishes the annotations.
    pub async fn publish(&self, data: &[u8]) -> Result<()> {
        self.annotate_and_publish(SdkAction::Publish, data).await
    }

    /// Closes the stream.
    pub async fn close(&self) -> Result<()> {
        self.stream.close().await
    }

    /// Runs every annotator over `data`, in configuration order.
    pub async fn annotate(&self, data: &[u8]) -> Result<AnnotationList> {
        let mut items = Vec::with_capacity(self.annotators.len());
        for annotator in &self.annotators {
            items.push(annotator.annotate(data).await?);
        }
        Ok(AnnotationList { items })
    }

    async fn annotate_and_publish(&self, action: SdkAction, data: &[u8]) -> Result<()> {
        let list = self.annotate(data).await?;
        let msg = PublishWrapper::new(action, ANNOTATION_LIST_MESSAGE_TYPE, &list)?;
        self.stream.publish(msg).await
    }
}
