//! Handlers for inbound workflow messages

mod end;
mod point;

pub use end::handle_end;
pub use point::handle_move_point;

use crate::bus::MessageBus;
use crate::cache::IdempotencyCache;
use crate::protocol::TopicSet;
use crate::simulator::Measurement;
use crate::workflow::Workflow;
use std::sync::Arc;

/// Capabilities passed to command handlers
#[derive(Clone)]
pub struct HandlerContext {
    pub bus: Arc<dyn MessageBus>,
    pub cache: Arc<IdempotencyCache>,
    pub simulator: Arc<dyn Measurement>,
    pub workflow: Arc<Workflow>,
    pub topics: Arc<TopicSet>,
}
