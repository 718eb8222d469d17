//! MQTT Alert — alert evaluation and dispatch over topic-tagged messages.

pub mod alerts;
pub mod config;
pub mod error;
pub mod notify;
pub mod transport;
