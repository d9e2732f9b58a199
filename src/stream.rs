/// In-process stream that records what it is given
pub mod mock;
/// MQTT publisher
pub mod mqtt;

#[cfg(not(feature = "mqtt"))]
use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
pub use mock::MockStream;
pub use mqtt::MqttPublisher;

use crate::{config::StreamInfo, message::PublishWrapper};

/// Destination for published annotation envelopes.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Opens the underlying connection. Succeeds immediately if already open.
    async fn connect(&self) -> Result<()>;

    /// Delivers `msg` to every configured destination.
    async fn publish(&self, msg: PublishWrapper) -> Result<()>;

    /// Shuts the connection down. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Builds the stream provider named by `info`.
pub fn new_stream_provider(info: &StreamInfo) -> Result<Box<dyn StreamProvider>> {
    let provider: Box<dyn StreamProvider> = match info {
        #[cfg(feature = "mqtt")]
        StreamInfo::Mqtt(config) => Box::new(MqttPublisher::new(config)?),
        #[cfg(not(feature = "mqtt"))]
        StreamInfo::Mqtt(_) => bail!("MQTT support was not compiled in; enable the `mqtt` feature."),
        StreamInfo::Mock => Box::new(MockStream::default()),
    };
    log::debug!("Created {info} stream provider");
    Ok(provider)
}
