//! End-of-job signal handler

use super::HandlerContext;
use tracing::info;

/// Handle a validated `end` message: the workflow publishes the completed
/// status and clears the idempotency cache
pub async fn handle_end(ctx: &HandlerContext) {
    info!("end signal received from controller");
    ctx.workflow.complete().await;
}
