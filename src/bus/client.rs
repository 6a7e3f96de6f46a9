//! MQTT bus client with automatic reconnection
//!
//! Wraps the rumqttc event loop behind a channel of [`BusEvent`]s so the main
//! loop consumes deliveries the same way it consumes connection lifecycle
//! changes. The last-will message is registered on the options before the
//! first connect attempt; the broker publishes it on our behalf if the
//! session drops uncleanly.

use crate::bus::traits::{MessageBus, QosLevel};
use crate::error::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Events emitted by the bus client
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// Session established; retained announcements may be published
    Connected,
    /// Session lost; reconnection is attempted after the configured backoff
    Disconnected { reason: String, was_connected: bool },
    /// Delivery on a subscribed topic
    Message { topic: String, payload: Bytes },
}

/// Connection parameters for the bus client
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
    /// Last-will target topic (retained)
    pub will_topic: String,
    /// Last-will payload
    pub will_payload: Bytes,
}

/// Owns the event stream of one broker session
pub struct BusClient {
    handle: BusHandle,
    event_rx: mpsc::Receiver<BusEvent>,
}

/// Cloneable publish/subscribe handle backed by the shared session
#[derive(Clone)]
pub struct BusHandle {
    client: AsyncClient,
}

impl BusClient {
    /// Create the client and start the connection loop
    pub fn new(config: BusConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_credentials(&config.username, &config.password);
        options.set_keep_alive(config.keep_alive);
        // Must be registered before connecting or an early drop goes unsignalled
        options.set_last_will(LastWill::new(
            &config.will_topic,
            config.will_payload.clone(),
            QoS::AtLeastOnce,
            true,
        ));

        let (client, event_loop) = AsyncClient::new(options, 64);
        let (event_tx, event_rx) = mpsc::channel(100);

        tokio::spawn(poll_loop(event_loop, event_tx, config.reconnect_delay));

        Self {
            handle: BusHandle { client },
            event_rx,
        }
    }

    /// Receive the next bus event
    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.event_rx.recv().await
    }

    /// Get a publish/subscribe handle for this session
    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }
}

/// Drive the rumqttc event loop, translating packets into [`BusEvent`]s.
///
/// Polling after an error re-runs the connect sequence, so the backoff sleep
/// here is the full reconnection policy.
async fn poll_loop(
    mut event_loop: EventLoop,
    event_tx: mpsc::Sender<BusEvent>,
    reconnect_delay: Duration,
) {
    let mut was_connected = false;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                was_connected = true;
                if event_tx.send(BusEvent::Connected).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let event = BusEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(event) => {
                debug!("bus event: {event:?}");
            }
            Err(error) => {
                // Before the first ConnAck this is a failed connect attempt
                let reason = if was_connected {
                    error.to_string()
                } else {
                    BusError::Connect(error.to_string()).to_string()
                };
                let event = BusEvent::Disconnected {
                    reason,
                    was_connected,
                };
                was_connected = false;
                if event_tx.send(event).await.is_err() {
                    break;
                }
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}

fn map_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

#[async_trait]
impl MessageBus for BusHandle {
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), BusError> {
        self.client
            .publish(topic, map_qos(qos), retain, payload)
            .await
            .map_err(|error| BusError::Publish {
                topic: topic.into(),
                reason: error.to_string(),
            })
    }

    async fn subscribe(&self, topic: &str, qos: QosLevel) -> Result<(), BusError> {
        self.client
            .subscribe(topic, map_qos(qos))
            .await
            .map_err(|error| BusError::Subscribe {
                topic: topic.into(),
                reason: error.to_string(),
            })
    }
}
