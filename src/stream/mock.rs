use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{message::PublishWrapper, stream::StreamProvider};

#[derive(Debug, Default)]
struct Recording {
    connected: bool,
    published: Vec<PublishWrapper>,
}

/// Stream provider that keeps every published envelope in memory.
///
/// Clones share the same recording, so a test can hold one handle while
/// another is owned by an [`Sdk`](crate::sdk::Sdk).
#[derive(Debug, Clone, Default)]
pub struct MockStream {
    recording: Arc<Mutex<Recording>>,
}

impl MockStream {
    /// Envelopes published so far, oldest first.
    pub async fn published(&self) -> Vec<PublishWrapper> {
        self.recording.lock().await.published.clone()
    }

    /// Whether the stream is currently open.
    pub async fn is_connected(&self) -> bool {
        self.recording.lock().await.connected
    }
}

#[async_trait]
impl StreamProvider for MockStream {
    async fn connect(&self) -> Result<()> {
        self.recording.lock().await.connected = true;
        Ok(())
    }

    async fn publish(&self, msg: PublishWrapper) -> Result<()> {
        log::trace!("recording {} {}", msg.action, msg.message_type);
        let mut recording = self.recording.lock().await;
        recording.connected = true;
        recording.published.push(msg);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.recording.lock().await.connected = false;
        Ok(())
    }
}
