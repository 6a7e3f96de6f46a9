//! Command processing for the executor peer
//!
//! This module handles:
//! - Parsing and routing delivery events by topic and message type
//! - The req_id-partitioned worker pool for concurrent point handling
//! - Dedup lookup, execution, and result publication per command

mod dispatcher;
pub mod handlers;

pub use dispatcher::CommandDispatcher;
pub use handlers::HandlerContext;
