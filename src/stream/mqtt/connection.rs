use std::time::Duration;
#[cfg(feature = "mqtt")]
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
#[cfg(feature = "mqtt")]
use anyhow::bail;
#[cfg(feature = "mqtt")]
use log::{debug, info, trace, warn};
#[cfg(feature = "mqtt")]
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::sync::oneshot;
#[cfg(feature = "mqtt")]
use tokio::{task::JoinHandle, time::timeout};

#[cfg(feature = "mqtt")]
use crate::{config::MqttConfig, error::AnnotationError};

/// Capacity of the request channel between the client and its event loop.
#[cfg(feature = "mqtt")]
const REQUEST_CAPACITY: usize = 64;

/// A single long-lived connection to a message broker.
///
/// [`MqttPublisher`](super::MqttPublisher) owns exactly one of these and
/// serializes every call against it.
#[async_trait]
pub trait BrokerConnection: Send {
    /// Whether the broker session is currently live.
    fn is_connected(&self) -> bool;

    /// Opens a session, waiting until the broker accepts or refuses it.
    async fn connect(&mut self) -> Result<()>;

    /// Hands `payload` to the client for delivery on `topic`.
    ///
    /// Returns once the message is queued; the token resolves when the
    /// broker confirms it. Dropping the token does not cancel the send.
    ///
    /// Must be cancel safe: if the future is dropped before it resolves,
    /// nothing is left queued and later tokens still match their messages.
    async fn send(&mut self, topic: &str, payload: Vec<u8>) -> Result<DeliveryToken>;

    /// Ends the session, giving in-flight work up to `grace` to drain.
    /// Does nothing if there is no session.
    async fn disconnect(&mut self, grace: Duration) -> Result<()>;
}

/// Completion handle for one queued message.
#[derive(Debug)]
pub struct DeliveryToken(oneshot::Receiver<()>);

impl DeliveryToken {
    /// Creates a token and the sender that completes it.
    pub fn channel() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    /// A token that is already complete.
    pub fn delivered() -> Self {
        let (tx, token) = Self::channel();
        let _ = tx.send(());
        token
    }

    /// Waits for the broker's confirmation.
    pub async fn wait(self) -> Result<()> {
        self.0
            .await
            .map_err(|_| anyhow!("Connection dropped before delivery was confirmed."))
    }
}

/// Messages handed to the client, waiting on the event loop.
#[cfg(feature = "mqtt")]
#[derive(Default)]
struct Inflight {
    /// Queued but not yet written, in queue order
    queued: VecDeque<oneshot::Sender<()>>,
    /// Written, waiting on PUBACK/PUBCOMP
    awaiting_ack: HashMap<u16, oneshot::Sender<()>>,
}

#[cfg(feature = "mqtt")]
struct Session {
    qos: QoS,
    connected: AtomicBool,
    inflight: Mutex<Inflight>,
}

#[cfg(feature = "mqtt")]
impl Session {
    fn new(qos: QoS) -> Self {
        Self {
            qos,
            connected: AtomicBool::new(false),
            inflight: Mutex::new(Inflight::default()),
        }
    }

    fn inflight(&self) -> MutexGuard<'_, Inflight> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a delivery token and hands the message to the client under
    /// one lock, so the event loop cannot report the write in between.
    /// Nothing is queued if `hand_off` fails.
    fn enqueue<E>(&self, hand_off: impl FnOnce() -> Result<(), E>) -> Result<DeliveryToken, E> {
        let mut inflight = self.inflight();
        hand_off()?;
        let (ack, token) = DeliveryToken::channel();
        inflight.queued.push_back(ack);
        Ok(token)
    }

    fn written(&self, pkid: u16) {
        let mut inflight = self.inflight();
        let Some(ack) = inflight.queued.pop_front() else {
            return;
        };
        if self.qos == QoS::AtMostOnce {
            let _ = ack.send(());
        } else {
            inflight.awaiting_ack.insert(pkid, ack);
        }
    }

    fn acknowledged(&self, pkid: u16) {
        if let Some(ack) = self.inflight().awaiting_ack.remove(&pkid) {
            let _ = ack.send(());
        }
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut inflight = self.inflight();
        inflight.queued.clear();
        inflight.awaiting_ack.clear();
    }
}

/// [`BrokerConnection`] backed by a `rumqttc` client.
///
/// Each successful `connect` starts a fresh event loop task. The task ends
/// when the connection drops, leaving `is_connected` false until the next
/// `connect`.
#[cfg(feature = "mqtt")]
pub struct RumqttcConnection {
    options: MqttOptions,
    qos: QoS,
    connect_timeout: Duration,
    client: Option<AsyncClient>,
    event_loop: Option<JoinHandle<()>>,
    session: Arc<Session>,
}

#[cfg(feature = "mqtt")]
impl RumqttcConnection {
    /// Prepares client options from `config`. Does not touch the network.
    pub fn new(config: &MqttConfig) -> Result<Self> {
        let qos = qos_level(config.qos)?;

        let provider = &config.provider;
        let mut options = MqttOptions::new(&config.client_id, &provider.host, provider.port);
        options.set_clean_session(config.cleanness);
        if !config.user.is_empty() {
            options.set_credentials(&config.user, &config.password);
        }
        match provider.protocol.as_str() {
            "tcp" | "mqtt" => {}
            "ssl" | "tls" | "mqtts" => {
                options.set_transport(Transport::tls_with_default_config());
            }
            other => bail!("Unsupported MQTT protocol '{other}'."),
        }

        Ok(Self {
            options,
            qos,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            client: None,
            event_loop: None,
            session: Arc::new(Session::new(qos)),
        })
    }

    fn teardown(&mut self) {
        if let Some(task) = self.event_loop.take() {
            task.abort();
        }
        self.client = None;
        self.session.close();
    }
}

#[cfg(feature = "mqtt")]
impl Drop for RumqttcConnection {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop.take() {
            task.abort();
        }
    }
}

#[cfg(feature = "mqtt")]
#[async_trait]
impl BrokerConnection for RumqttcConnection {
    fn is_connected(&self) -> bool {
        self.client.is_some() && self.session.connected.load(Ordering::SeqCst)
    }

    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.teardown();

        let (host, port) = self.options.broker_address();
        let broker = format!("{host}:{port}");
        debug!("Connecting to MQTT broker {broker}");

        let (client, event_loop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        let session = Arc::new(Session::new(self.qos));
        let (connack_tx, connack_rx) = oneshot::channel();
        let task = tokio::spawn(drive_event_loop(event_loop, session.clone(), connack_tx));

        let outcome = match timeout(self.connect_timeout, connack_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(reason),
            Ok(Err(_)) => Err("event loop stopped before the broker answered".to_owned()),
            Err(_) => Err(format!(
                "no answer from broker within {} ms",
                self.connect_timeout.as_millis()
            )),
        };

        match outcome {
            Ok(()) => {
                info!("Connected to MQTT broker {broker}");
                self.client = Some(client);
                self.event_loop = Some(task);
                self.session = session;
                Ok(())
            }
            Err(reason) => {
                task.abort();
                Err(AnnotationError::Connection(format!("{broker}: {reason}")).into())
            }
        }
    }

    async fn send(&mut self, topic: &str, payload: Vec<u8>) -> Result<DeliveryToken> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AnnotationError::Connection("not connected".to_owned()))?;

        self.session
            .enqueue(|| client.try_publish(topic, self.qos, false, payload))
            .map_err(|e| anyhow!("Failed to queue publish to {topic}: {e}"))
    }

    async fn disconnect(&mut self, grace: Duration) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };

        if let Err(e) = client.disconnect().await {
            warn!("MQTT disconnect request failed: {e}");
        }
        if let Some(mut task) = self.event_loop.take() {
            if timeout(grace, &mut task).await.is_err() {
                debug!("MQTT event loop still busy after {} ms, aborting", grace.as_millis());
                task.abort();
            }
        }
        self.session.close();
        info!("Disconnected from MQTT broker");

        Ok(())
    }
}

#[cfg(feature = "mqtt")]
fn qos_level(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        n => bail!("MQTT qos must be 0, 1 or 2, got {n}"),
    }
}

#[cfg(feature = "mqtt")]
async fn drive_event_loop(
    mut event_loop: EventLoop,
    session: Arc<Session>,
    connack: oneshot::Sender<Result<(), String>>,
) {
    let mut connack = Some(connack);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                session.connected.store(true, Ordering::SeqCst);
                if let Some(tx) = connack.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => session.written(pkid),
            Ok(Event::Incoming(Packet::PubAck(ack))) => session.acknowledged(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => session.acknowledged(comp.pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(event) => trace!("MQTT event {event:?}"),
            Err(e) => {
                match connack.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(e.to_string()));
                    }
                    None => warn!("MQTT connection lost: {e}"),
                }
                break;
            }
        }
    }

    session.close();
}
