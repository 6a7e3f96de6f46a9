//! Workflow state machine
//!
//! Drives the ready -> start -> (points) -> end sequence for one job run:
//! retained announcements and subscriptions on connect, the delayed start
//! signal, the informational AwaitingPeer -> Active transition, and the job
//! boundary that clears the idempotency cache.

use crate::bus::{MessageBus, QosLevel};
use crate::cache::IdempotencyCache;
use crate::protocol::{
    OperatingEnvelope, SettingMessage, StartMessage, StatusMessage, TopicSet,
};
use anyhow::Result;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Lifecycle of one job run.
///
/// AwaitingPeer vs Active is an observability signal only; point commands are
/// accepted in both states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// Not connected yet
    Idle,
    /// Connected, retained announcements published
    Announcing,
    /// Start signal sent, waiting for the first controller command
    AwaitingPeer,
    /// At least one command accepted
    Active,
    /// End signal processed; terminal until the next connect
    Completed,
}

/// Owns the workflow state and the announce/complete side effects
pub struct Workflow {
    executor_id: String,
    topics: Arc<TopicSet>,
    bus: Arc<dyn MessageBus>,
    cache: Arc<IdempotencyCache>,
    envelope: OperatingEnvelope,
    warmup_delay: Duration,
    state: RwLock<WorkflowState>,
}

impl Workflow {
    pub fn new(
        executor_id: String,
        topics: Arc<TopicSet>,
        bus: Arc<dyn MessageBus>,
        cache: Arc<IdempotencyCache>,
        envelope: OperatingEnvelope,
        warmup_delay: Duration,
    ) -> Self {
        Self {
            executor_id,
            topics,
            bus,
            cache,
            envelope,
            warmup_delay,
            state: RwLock::new(WorkflowState::Idle),
        }
    }

    pub async fn state(&self) -> WorkflowState {
        *self.state.read().await
    }

    /// Announce this executor on a fresh session.
    ///
    /// Subscribes to the inbound topics, publishes the retained status and
    /// configuration, then schedules the start signal after the warm-up delay
    /// without blocking the caller's event loop.
    pub async fn on_connected(self: Arc<Self>) -> Result<()> {
        *self.state.write().await = WorkflowState::Announcing;

        self.bus
            .subscribe(&self.topics.cmd_point, QosLevel::AtLeastOnce)
            .await?;
        self.bus
            .subscribe(&self.topics.ctrl_end, QosLevel::AtLeastOnce)
            .await?;

        self.publish_json(
            &self.topics.status,
            &StatusMessage::ready(),
            QosLevel::AtLeastOnce,
            true,
        )
        .await?;
        info!("announced ready status");

        // Safety-critical configuration state: strongest delivery guarantee
        self.publish_json(
            &self.topics.config_setting,
            &SettingMessage::new(self.envelope.clone()),
            QosLevel::ExactlyOnce,
            true,
        )
        .await?;
        info!("published operating configuration");

        let workflow = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(workflow.warmup_delay).await;
            workflow.announce_start().await;
        });

        Ok(())
    }

    /// Publish the start signal with a freshly generated job identifier
    async fn announce_start(&self) {
        let job_id = format!(
            "job-{}-{}",
            self.executor_id,
            &Uuid::new_v4().to_string()[..8]
        );
        let message = StartMessage::new(job_id.clone());

        match self
            .publish_json(&self.topics.ctrl_start, &message, QosLevel::AtLeastOnce, false)
            .await
        {
            Ok(()) => {
                *self.state.write().await = WorkflowState::AwaitingPeer;
                info!(%job_id, "start signal published, awaiting controller");
            }
            Err(error) => {
                warn!("failed to publish start signal: {error}");
            }
        }
    }

    /// Record the first accepted command (observability only)
    pub async fn note_command_accepted(&self) {
        let mut state = self.state.write().await;
        if *state == WorkflowState::AwaitingPeer {
            *state = WorkflowState::Active;
            info!("first command accepted, job active");
        }
    }

    /// Process the validated end signal: retained completed status, cache
    /// cleared, state terminal for this run
    pub async fn complete(&self) {
        if let Err(error) = self
            .publish_json(
                &self.topics.status,
                &StatusMessage::completed(),
                QosLevel::AtLeastOnce,
                true,
            )
            .await
        {
            warn!("failed to publish completed status: {error}");
        }

        let dropped = self.cache.len();
        self.cache.clear();
        *self.state.write().await = WorkflowState::Completed;
        info!("job completed, {dropped} cached results dropped");
    }

    async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        message: &T,
        qos: QosLevel,
        retain: bool,
    ) -> Result<()> {
        let payload = Bytes::from(serde_json::to_vec(message)?);
        self.bus.publish(topic, payload, qos, retain).await?;
        Ok(())
    }
}
