//! Command dispatcher
//!
//! Routes delivery events to handlers by topic and message type. Point
//! commands are fanned out to a fixed worker pool partitioned by `req_id`
//! hash: duplicates of one request always land on the same worker and are
//! therefore serialized against each other (the cache read-check-insert race
//! cannot happen), while distinct requests proceed concurrently. Commands
//! without a `req_id` rotate round-robin.

use super::handlers::{self, HandlerContext};
use crate::protocol::{InboundMessage, Point};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

struct PointJob {
    point: Point,
    req_id: Option<String>,
}

/// Consumes the bus delivery stream and drives command handling
pub struct CommandDispatcher {
    ctx: HandlerContext,
    workers: Vec<mpsc::Sender<PointJob>>,
    next_worker: AtomicUsize,
}

impl CommandDispatcher {
    /// Create the dispatcher and spawn its point workers
    pub fn new(ctx: HandlerContext, worker_count: usize) -> Self {
        let mut workers = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            let (job_tx, mut job_rx) = mpsc::channel::<PointJob>(32);
            let worker_ctx = ctx.clone();
            tokio::spawn(async move {
                while let Some(job) = job_rx.recv().await {
                    handlers::handle_move_point(&worker_ctx, job.point, job.req_id).await;
                }
            });
            workers.push(job_tx);
        }

        Self {
            ctx,
            workers,
            next_worker: AtomicUsize::new(0),
        }
    }

    /// Route one delivery event; protocol noise is logged and discarded
    pub async fn handle(&self, topic: &str, payload: &[u8]) {
        let message: InboundMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(failure) => {
                warn!(topic, "discarding unparseable message: {failure}");
                return;
            }
        };

        match message {
            InboundMessage::MovePoint { point, req_id, .. }
                if topic == self.ctx.topics.cmd_point =>
            {
                let index = self.partition(req_id.as_deref());
                if self.workers[index]
                    .send(PointJob { point, req_id })
                    .await
                    .is_err()
                {
                    error!("point worker {index} is gone, dropping command");
                }
            }
            InboundMessage::End { .. } if topic == self.ctx.topics.ctrl_end => {
                handlers::handle_end(&self.ctx).await;
            }
            _ => {
                debug!(topic, "ignoring message of unexpected type for topic");
            }
        }
    }

    fn partition(&self, req_id: Option<&str>) -> usize {
        match req_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                let mut hasher = DefaultHasher::new();
                id.hash(&mut hasher);
                (hasher.finish() as usize) % self.workers.len()
            }
            None => self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::traits::testing::RecordingBus;
    use crate::cache::IdempotencyCache;
    use crate::protocol::{OperatingEnvelope, ResultRecord, TopicSet};
    use crate::simulator::testing::StubMeasurement;
    use crate::workflow::{Workflow, WorkflowState};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        dispatcher: CommandDispatcher,
        bus: Arc<RecordingBus>,
        cache: Arc<IdempotencyCache>,
        workflow: Arc<Workflow>,
        simulator: Arc<StubMeasurement>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(RecordingBus::new());
        let cache = Arc::new(IdempotencyCache::default());
        let topics = Arc::new(TopicSet::new("id1"));
        let simulator = Arc::new(StubMeasurement::succeeding());
        let workflow = Arc::new(Workflow::new(
            "id1".into(),
            topics.clone(),
            bus.clone(),
            cache.clone(),
            OperatingEnvelope::default(),
            Duration::from_secs(1),
        ));
        let ctx = HandlerContext {
            bus: bus.clone(),
            cache: cache.clone(),
            simulator: simulator.clone(),
            workflow: workflow.clone(),
            topics,
        };
        Fixture {
            dispatcher: CommandDispatcher::new(ctx, 4),
            bus,
            cache,
            workflow,
            simulator,
        }
    }

    /// Wait until the worker pool has published `count` results
    async fn wait_for_results(bus: &RecordingBus, count: usize) {
        for _ in 0..100 {
            if bus.payloads_on("v1/id1/telemetry/result").len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} results, saw {}",
            bus.payloads_on("v1/id1/telemetry/result").len()
        );
    }

    #[tokio::test]
    async fn test_point_command_produces_result() {
        let fixture = fixture();
        let raw = br#"{"type":"move_point","point":{"x":10.0,"y":0.0},"req_id":"A1","sender":"A"}"#;

        fixture.dispatcher.handle("v1/id1/cmd/point", raw).await;
        wait_for_results(&fixture.bus, 1).await;

        let payload = &fixture.bus.payloads_on("v1/id1/telemetry/result")[0];
        let record: ResultRecord = serde_json::from_slice(payload).expect("result parse");
        match record {
            ResultRecord::FeatureSet { point, req_id, .. } => {
                assert_eq!(point.x, 10.0);
                assert_eq!(point.y, 0.0);
                assert_eq!(req_id.as_deref(), Some("A1"));
            }
            other => panic!("unexpected record: {other:?}"),
        }
        assert!(fixture.cache.lookup("A1").is_some());
    }

    #[tokio::test]
    async fn test_duplicate_deliveries_execute_once() {
        let fixture = fixture();
        let raw = br#"{"type":"move_point","point":{"x":1.0,"y":2.0},"req_id":"dup","sender":"A"}"#;

        fixture.dispatcher.handle("v1/id1/cmd/point", raw).await;
        fixture.dispatcher.handle("v1/id1/cmd/point", raw).await;
        wait_for_results(&fixture.bus, 2).await;

        // Same req_id lands on the same worker: one execution, identical bytes
        assert_eq!(fixture.simulator.calls(), 1);
        let results = fixture.bus.payloads_on("v1/id1/telemetry/result");
        assert_eq!(results[0], results[1]);
    }

    #[tokio::test]
    async fn test_end_completes_workflow() {
        let fixture = fixture();
        fixture
            .cache
            .insert("stale".into(), Bytes::from_static(b"x"));
        let raw = br#"{"type":"end","ts":1757000000,"sender":"A"}"#;

        fixture.dispatcher.handle("v1/id1/ctrl/end", raw).await;

        assert_eq!(fixture.workflow.state().await, WorkflowState::Completed);
        assert!(fixture.cache.is_empty());
        let statuses = fixture.bus.payloads_on("v1/id1/status");
        assert_eq!(statuses.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_discarded() {
        let fixture = fixture();

        fixture.dispatcher.handle("v1/id1/cmd/point", b"{not json").await;
        fixture
            .dispatcher
            .handle("v1/id1/cmd/point", br#"{"type":"reboot"}"#)
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fixture.bus.published().is_empty());
        assert_eq!(fixture.simulator.calls(), 0);
    }

    #[tokio::test]
    async fn test_type_topic_mismatch_is_ignored() {
        let fixture = fixture();

        // An end message on the point topic must not complete the workflow
        fixture
            .dispatcher
            .handle("v1/id1/cmd/point", br#"{"type":"end","sender":"A"}"#)
            .await;
        // A point command on the end topic must not execute
        fixture
            .dispatcher
            .handle(
                "v1/id1/ctrl/end",
                br#"{"type":"move_point","point":{"x":0,"y":0}}"#,
            )
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_ne!(fixture.workflow.state().await, WorkflowState::Completed);
        assert_eq!(fixture.simulator.calls(), 0);
        assert!(fixture.bus.published().is_empty());
    }
}
