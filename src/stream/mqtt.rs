/// Broker connection seam and its `rumqttc` implementation
pub mod connection;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use log::{debug, trace, warn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::{
    sync::Mutex,
    time::{timeout_at, Instant},
};

#[cfg(feature = "mqtt")]
pub use connection::RumqttcConnection;
pub use connection::{BrokerConnection, DeliveryToken};
#[cfg(feature = "mqtt")]
use crate::config::MqttConfig;
use crate::{
    message::{PublishWrapper, SdkAction},
    stream::StreamProvider,
};

/// How long each topic's send may take, queueing and confirmation together.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_millis(2000);
/// Grace period for in-flight work when closing.
pub const WAIT_ON_CLOSE: Duration = Duration::from_millis(250);

/// Publishes envelopes to every configured MQTT topic over one connection.
///
/// `connect`, `publish` and `close` hold the connection lock for their whole
/// duration, so the liveness check, the reconnect and the fan-out of one
/// publish never interleave with another call.
pub struct MqttPublisher<C: BrokerConnection> {
    topics: Vec<String>,
    connection: Mutex<C>,
}

#[cfg(feature = "mqtt")]
impl MqttPublisher<RumqttcConnection> {
    /// Creates a publisher for `config`. No connection is made until
    /// `connect` or the first `publish`.
    pub fn new(config: &MqttConfig) -> Result<Self> {
        config.validate()?;
        let connection = RumqttcConnection::new(config)?;
        Ok(Self::with_connection(config.topics.clone(), connection))
    }
}

impl<C: BrokerConnection> MqttPublisher<C> {
    /// Creates a publisher that fans out to `topics` over `connection`.
    pub fn with_connection(topics: Vec<String>, connection: C) -> Self {
        Self {
            topics,
            connection: Mutex::new(connection),
        }
    }

    /// Topics each message is published to, in order.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

/// Makes one connect attempt if the connection is not live.
async fn reconnect<C: BrokerConnection>(connection: &mut C) -> Result<()> {
    if !connection.is_connected() {
        connection.connect().await?;
    }
    Ok(())
}

#[async_trait]
impl<C: BrokerConnection> StreamProvider for MqttPublisher<C> {
    async fn connect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        reconnect(&mut *connection).await
    }

    async fn publish(&self, msg: PublishWrapper) -> Result<()> {
        let mut connection = self.connection.lock().await;
        reconnect(&mut *connection).await?;

        let payload = MqttWrapper::try_from(&msg)?.to_vec()?;

        for topic in &self.topics {
            debug!(
                "attempting publish, topic {topic} {}",
                String::from_utf8_lossy(&payload)
            );
            let deadline = Instant::now() + PUBLISH_TIMEOUT;

            let token = match timeout_at(deadline, connection.send(topic, payload.clone())).await {
                Ok(Ok(token)) => token,
                Ok(Err(e)) => {
                    warn!("publish to {topic} failed: {e:#}");
                    continue;
                }
                Err(_) => {
                    warn!(
                        "could not queue publish to {topic} within {} ms",
                        PUBLISH_TIMEOUT.as_millis()
                    );
                    continue;
                }
            };

            match timeout_at(deadline, token.wait()).await {
                Ok(Ok(())) => trace!("published to {topic}"),
                Ok(Err(e)) => warn!("publish to {topic} failed: {e:#}"),
                Err(_) => warn!(
                    "no confirmation from {topic} within {} ms",
                    PUBLISH_TIMEOUT.as_millis()
                ),
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        connection.disconnect(WAIT_ON_CLOSE).await
    }
}

/// Wire form of a [`PublishWrapper`].
///
/// `content` is the JSON encoding of the wrapper's content, carried as a
/// base64 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttWrapper {
    /// What happened to the data
    pub action: SdkAction,
    /// Discriminator for the shape of `content`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_type: String,
    /// JSON encoded content
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "to_base64",
        deserialize_with = "from_base64"
    )]
    pub content: Vec<u8>,
}

impl MqttWrapper {
    /// Serializes the wrapper for the wire.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl TryFrom<&PublishWrapper> for MqttWrapper {
    type Error = anyhow::Error;

    fn try_from(msg: &PublishWrapper) -> Result<Self> {
        Ok(Self {
            action: msg.action,
            message_type: msg.message_type.clone(),
            content: serde_json::to_vec(&msg.content)?,
        })
    }
}

fn to_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    BASE64.decode(s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::{error::AnnotationError, message::ANNOTATION_LIST_MESSAGE_TYPE};

    #[derive(Default)]
    struct Script {
        connected: bool,
        refuse_connect: bool,
        connects: usize,
        disconnects: usize,
        sent: Vec<(String, Vec<u8>)>,
        stall: HashSet<String>,
        stall_send: HashSet<String>,
        reject: HashSet<String>,
        stalled: Vec<oneshot::Sender<()>>,
    }

    /// Broker stand-in whose behavior is set per test.
    #[derive(Clone, Default)]
    struct ScriptedConnection(Arc<std::sync::Mutex<Script>>);

    impl ScriptedConnection {
        fn script(&self) -> std::sync::MutexGuard<'_, Script> {
            self.0.lock().unwrap()
        }
    }

    #[async_trait]
    impl BrokerConnection for ScriptedConnection {
        fn is_connected(&self) -> bool {
            self.script().connected
        }

        async fn connect(&mut self) -> Result<()> {
            let mut script = self.script();
            script.connects += 1;
            if script.refuse_connect {
                return Err(AnnotationError::Connection("refused".to_owned()).into());
            }
            script.connected = true;
            Ok(())
        }

        async fn send(&mut self, topic: &str, payload: Vec<u8>) -> Result<DeliveryToken> {
            let blocked = {
                let mut script = self.script();
                script.sent.push((topic.to_owned(), payload));
                script.stall_send.contains(topic)
            };
            if blocked {
                std::future::pending::<()>().await;
            }

            let mut script = self.script();
            if script.reject.contains(topic) {
                anyhow::bail!("broker rejected {topic}");
            }
            if script.stall.contains(topic) {
                let (ack, token) = DeliveryToken::channel();
                script.stalled.push(ack);
                return Ok(token);
            }
            Ok(DeliveryToken::delivered())
        }

        async fn disconnect(&mut self, _grace: Duration) -> Result<()> {
            let mut script = self.script();
            if script.connected {
                script.connected = false;
                script.disconnects += 1;
            }
            Ok(())
        }
    }

    fn topics() -> Vec<String> {
        vec!["alpha".to_owned(), "beta".to_owned(), "gamma".to_owned()]
    }

    fn message() -> PublishWrapper {
        PublishWrapper::new(
            SdkAction::Create,
            ANNOTATION_LIST_MESSAGE_TYPE,
            &json!({ "items": [] }),
        )
        .unwrap()
    }

    fn sent_topics(connection: &ScriptedConnection) -> Vec<String> {
        connection
            .script()
            .sent
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    #[tokio::test]
    async fn publish_while_disconnected_reconnects_once() {
        let _ = env_logger::builder().is_test(true).try_init();
        let connection = ScriptedConnection::default();
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        publisher.publish(message()).await.unwrap();

        assert_eq!(connection.script().connects, 1);
        assert_eq!(sent_topics(&connection), topics());
    }

    #[tokio::test]
    async fn failed_reconnect_sends_nothing() {
        let connection = ScriptedConnection::default();
        connection.script().refuse_connect = true;
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        let err = publisher.publish(message()).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AnnotationError>(),
            Some(AnnotationError::Connection(_))
        ));
        assert_eq!(connection.script().connects, 1);
        assert!(connection.script().sent.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_topic_does_not_block_the_rest() {
        let connection = ScriptedConnection::default();
        connection.script().stall.insert("beta".to_owned());
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        let started = tokio::time::Instant::now();
        publisher.publish(message()).await.unwrap();

        assert_eq!(sent_topics(&connection), topics());
        assert!(started.elapsed() >= PUBLISH_TIMEOUT);
        assert!(started.elapsed() < PUBLISH_TIMEOUT * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_send_does_not_block_the_rest() {
        let connection = ScriptedConnection::default();
        connection.script().stall_send.insert("alpha".to_owned());
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        let started = tokio::time::Instant::now();
        publisher.publish(message()).await.unwrap();

        assert_eq!(sent_topics(&connection), topics());
        assert!(started.elapsed() >= PUBLISH_TIMEOUT);
        assert!(started.elapsed() < PUBLISH_TIMEOUT * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn queueing_and_confirmation_share_one_deadline() {
        let connection = ScriptedConnection::default();
        {
            let mut script = connection.script();
            script.stall_send.insert("alpha".to_owned());
            script.stall.insert("beta".to_owned());
        }
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        let started = tokio::time::Instant::now();
        publisher.publish(message()).await.unwrap();

        assert_eq!(sent_topics(&connection), topics());
        assert!(started.elapsed() >= PUBLISH_TIMEOUT * 2);
        assert!(started.elapsed() < PUBLISH_TIMEOUT * 3);
    }

    #[tokio::test]
    async fn failing_topic_does_not_abort_the_rest() {
        let connection = ScriptedConnection::default();
        connection.script().reject.insert("alpha".to_owned());
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        publisher.publish(message()).await.unwrap();

        assert_eq!(sent_topics(&connection), topics());
    }

    #[tokio::test]
    async fn payload_is_identical_across_topics() {
        let connection = ScriptedConnection::default();
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        publisher.publish(message()).await.unwrap();

        let script = connection.script();
        let first = &script.sent[0].1;
        assert!(script.sent.iter().all(|(_, payload)| payload == first));

        let wire: MqttWrapper = serde_json::from_slice(first).unwrap();
        assert_eq!(wire.action, SdkAction::Create);
        assert_eq!(wire.message_type, ANNOTATION_LIST_MESSAGE_TYPE);
        let content: serde_json::Value = serde_json::from_slice(&wire.content).unwrap();
        assert_eq!(content, json!({ "items": [] }));
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let connection = ScriptedConnection::default();
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        publisher.connect().await.unwrap();
        publisher.connect().await.unwrap();
        publisher.publish(message()).await.unwrap();

        assert_eq!(connection.script().connects, 1);
    }

    #[tokio::test]
    async fn close_twice_succeeds() {
        let connection = ScriptedConnection::default();
        let publisher = MqttPublisher::with_connection(topics(), connection.clone());

        publisher.connect().await.unwrap();
        publisher.close().await.unwrap();
        publisher.close().await.unwrap();

        assert_eq!(connection.script().disconnects, 1);
        assert!(!connection.script().connected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_share_one_reconnect() {
        let connection = ScriptedConnection::default();
        let publisher = Arc::new(MqttPublisher::with_connection(
            topics(),
            connection.clone(),
        ));
        let completed = Arc::new(AtomicUsize::new(0));

        let handles = (0..8)
            .map(|_| {
                let publisher = publisher.clone();
                let completed = completed.clone();
                tokio::spawn(async move {
                    publisher.publish(message()).await.unwrap();
                    completed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(completed.load(Ordering::SeqCst), 8);
        assert_eq!(connection.script().connects, 1);
        assert_eq!(connection.script().sent.len(), 8 * topics().len());
    }

    #[test]
    fn wire_shape() {
        let wrapper = MqttWrapper::try_from(&message()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&wrapper.to_vec().unwrap()).unwrap();

        assert_eq!(value["action"], json!("create"));
        assert_eq!(value["messageType"], json!("AnnotationList"));
        assert_eq!(
            value["content"],
            json!(BASE64.encode(br#"{"items":[]}"#))
        );
    }

    #[test]
    fn empty_fields_are_omitted() {
        let wrapper = MqttWrapper {
            action: SdkAction::Transit,
            message_type: String::new(),
            content: Vec::new(),
        };
        let value: serde_json::Value = serde_json::from_slice(&wrapper.to_vec().unwrap()).unwrap();
        assert_eq!(value, json!({ "action": "transit" }));

        let parsed: MqttWrapper = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, wrapper);
    }
}
