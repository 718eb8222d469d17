//! Error types for mqtt-alert.

use std::time::Duration;

use crate::alerts::manager::RuleId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Rule construction, evaluation, and persistence errors.
///
/// Construction errors are fatal to the rule being built — a rule never
/// exists in a partially-valid state. Evaluation errors are isolated per
/// rule and never abort a message pass.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Invalid condition {condition:?}: {reason}")]
    InvalidCondition { condition: String, reason: String },

    #[error("Invalid topic filter {filter:?}: {reason}")]
    InvalidTopicFilter { filter: String, reason: String },

    #[error("Invalid recipient {address:?}: {reason}")]
    InvalidRecipient { address: String, reason: String },

    #[error("Interval {field} of {secs}s is out of range")]
    InvalidInterval { field: &'static str, secs: u64 },

    #[error("Condition field {field:?} not present in message on {topic}")]
    MissingField { field: String, topic: String },

    #[error("No rule with id {0}")]
    RuleNotFound(RuleId),

    #[error("Failed to read rule file {path}: {source}")]
    StoreIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Rule file {path} is not valid: {source}")]
    StoreFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Notification sink errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid recipient {address:?}: {reason}")]
    InvalidRecipient { address: String, reason: String },

    #[error("Sink {name} failed to send: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Sink {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

/// Inbound transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Payload on {topic} is not usable: {reason}")]
    InvalidPayload { topic: String, reason: String },

    #[error("MQTT connection error: {0}")]
    Connection(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
