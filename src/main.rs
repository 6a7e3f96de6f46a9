mod bus;
mod cache;
mod command;
mod config;
mod error;
mod protocol;
mod simulator;
mod workflow;

use bus::{BusClient, BusConfig, BusEvent, MessageBus};
use cache::IdempotencyCache;
use command::{CommandDispatcher, HandlerContext};
use config::ExecutorConfig;
use protocol::{OperatingEnvelope, StatusMessage, TopicSet};
use simulator::{Measurement, VibrationSimulator};
use std::sync::Arc;
use workflow::Workflow;

use bytes::Bytes;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ExecutorConfig::from_env();

    info!("Measurement executor starting: {}", config.executor_id);
    info!(
        "  broker: {}:{} (tls port {})",
        config.broker_host, config.broker_port, config.broker_tls_port
    );

    let topics = Arc::new(TopicSet::new(&config.executor_id));
    let envelope = OperatingEnvelope::default();

    let mut client = BusClient::new(BusConfig {
        host: config.broker_host.clone(),
        port: config.broker_port,
        client_id: config.client_id(),
        username: config.username.clone(),
        password: config.password.clone(),
        keep_alive: config.keep_alive,
        reconnect_delay: config.reconnect_delay,
        will_topic: topics.status.clone(),
        will_payload: Bytes::from(serde_json::to_vec(&StatusMessage::will())?),
    });
    let bus: Arc<dyn MessageBus> = Arc::new(client.handle());

    let cache = Arc::new(IdempotencyCache::new(config.cache_capacity));
    let simulator: Arc<dyn Measurement> = Arc::new(VibrationSimulator::new(envelope.clone()));
    let workflow = Arc::new(Workflow::new(
        config.executor_id.clone(),
        topics.clone(),
        bus.clone(),
        cache.clone(),
        envelope,
        config.warmup_delay,
    ));
    let dispatcher = CommandDispatcher::new(
        HandlerContext {
            bus,
            cache,
            simulator,
            workflow: workflow.clone(),
            topics,
        },
        config.worker_count,
    );

    // Main event loop
    loop {
        match client.recv().await {
            Some(BusEvent::Connected) => {
                info!("connected to broker");
                if let Err(failure) = workflow.clone().on_connected().await {
                    error!("failed to announce executor: {failure}");
                }
            }
            Some(BusEvent::Disconnected {
                reason,
                was_connected,
            }) => {
                if was_connected {
                    warn!("disconnected: {reason}, reconnecting after backoff");
                } else {
                    warn!("connection attempt failed: {reason}");
                }
            }
            Some(BusEvent::Message { topic, payload }) => {
                dispatcher.handle(&topic, &payload).await;
            }
            None => {
                error!("bus event stream closed");
                break;
            }
        }
    }

    Ok(())
}
