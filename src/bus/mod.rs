//! Message bus integration
//!
//! This module handles:
//! - The publish/subscribe capability trait consumed by the rest of the core
//! - The rumqttc-backed client with last-will registration and reconnection
//! - The delivery event stream feeding the main loop

mod client;
pub mod traits;

pub use client::{BusClient, BusConfig, BusEvent, BusHandle};
pub use traits::{MessageBus, QosLevel};
