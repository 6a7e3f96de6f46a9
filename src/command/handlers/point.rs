//! Positioning command handler
//!
//! The at-most-once execution guarantee lives here: a command whose `req_id`
//! is already cached gets the previously published bytes replayed verbatim,
//! never a second measurement. Error results are published but not cached, so
//! a controller retry after a failure re-executes.

use super::HandlerContext;
use crate::bus::QosLevel;
use crate::protocol::{Point, ResultRecord};
use bytes::Bytes;
use tracing::{error, info, warn};

/// Handle a `move_point` command: dedup lookup, measurement, result publish
pub async fn handle_move_point(ctx: &HandlerContext, point: Point, req_id: Option<String>) {
    let dedup_key = req_id.as_deref().filter(|id| !id.is_empty());

    if let Some(key) = dedup_key {
        if let Some(cached) = ctx.cache.lookup(key) {
            info!(req_id = key, "duplicate command, replaying cached result");
            publish_result(ctx, cached).await;
            return;
        }
    }

    ctx.workflow.note_command_accepted().await;
    info!(
        "measuring point ({:.2}, {:.2}), req_id={:?}",
        point.x, point.y, req_id
    );

    let record = match ctx.simulator.measure(point).await {
        Ok(report) => ResultRecord::feature_set(
            point,
            report.features,
            report.values,
            report.analysis_info,
            req_id.clone(),
        ),
        Err(failure) => {
            warn!(
                "measurement failed at ({:.2}, {:.2}): {failure}",
                point.x, point.y
            );
            ResultRecord::error(point, failure.to_string(), req_id.clone())
        }
    };

    let payload = match serde_json::to_vec(&record) {
        Ok(bytes) => Bytes::from(bytes),
        Err(failure) => {
            error!("failed to serialize result record: {failure}");
            return;
        }
    };

    // Cache before publishing so a duplicate arriving right after the publish
    // already replays; the cache lock is never held across the publish itself
    if !record.is_error() {
        if let Some(key) = record.req_id().filter(|id| !id.is_empty()) {
            ctx.cache.insert(key.to_owned(), payload.clone());
        }
    }

    publish_result(ctx, payload).await;
}

async fn publish_result(ctx: &HandlerContext, payload: Bytes) {
    if let Err(failure) = ctx
        .bus
        .publish(
            &ctx.topics.telemetry_result,
            payload,
            QosLevel::AtLeastOnce,
            false,
        )
        .await
    {
        // Abandoned by design: the controller's retry path covers the loss
        warn!("failed to publish result: {failure}");
    }
}
