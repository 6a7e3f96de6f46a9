//! Bus capability trait for publish/subscribe backends
//!
//! The dispatcher and workflow only ever see this trait; the rumqttc-backed
//! client implements it for production and the tests substitute a recording
//! fake.

use crate::error::BusError;
use async_trait::async_trait;
use bytes::Bytes;

/// Delivery guarantee requested for a publish or subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Publish/subscribe capability of the message bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload; `retain` asks the broker to redeliver it to any
    /// future subscriber until superseded
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), BusError>;

    /// Subscribe to a topic at the given delivery guarantee
    async fn subscribe(&self, topic: &str, qos: QosLevel) -> Result<(), BusError>;
}
