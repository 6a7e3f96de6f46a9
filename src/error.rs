//! Error types for the executor peer.
//!
//! Protocol noise (unparseable payloads) and simulation failures never
//! propagate upward: the dispatcher discards the former and converts the
//! latter into a `result_error` record. Only connection-level failures are
//! surfaced, and those drive the reconnect backoff rather than a crash.

use thiserror::Error;

/// Failures reported by the bus client adapter
#[derive(Error, Debug)]
pub enum BusError {
    /// Network or auth failure while establishing the connection
    #[error("connect failed: {0}")]
    Connect(String),

    /// The adapter refused the publish (e.g. not connected)
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// The adapter refused the subscription
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Failures reported by the measurement device
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Target lies outside the published operating envelope
    #[error("target ({x:.2}, {y:.2}) outside operating envelope")]
    OutOfBounds { x: f64, y: f64 },
}
