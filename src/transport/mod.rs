//! Inbound transport — decoded topic-tagged messages.

pub mod client;

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::TransportError;

pub use client::{MqttConfig, MqttListener};

/// One decoded inbound observation.
///
/// Owned by the transport side; the alert engine borrows it for a single
/// evaluation pass and retains nothing.
#[derive(Debug, Clone)]
pub struct TopicMessage {
    pub topic: String,
    /// Structured payload, field name → value.
    pub fields: Map<String, Value>,
    /// Assigned at ingestion, not by the sender.
    pub received_at: DateTime<Utc>,
}

impl TopicMessage {
    /// Decode a raw payload. Payloads are expected to be JSON objects of
    /// field → value.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, TransportError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| TransportError::InvalidPayload {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        let Value::Object(fields) = value else {
            return Err(TransportError::InvalidPayload {
                topic: topic.to_string(),
                reason: "payload is not a JSON object".to_string(),
            });
        };

        Ok(Self {
            topic: topic.to_string(),
            fields,
            received_at: Utc::now(),
        })
    }
}

impl fmt::Display for TopicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} field(s)",
            self.received_at.format("%Y-%m-%d %H:%M:%S"),
            self.topic,
            self.fields.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_json_object_payload() {
        let msg = TopicMessage::decode("device/sensor1", br#"{"temperature": 30, "status": "ok"}"#)
            .unwrap();
        assert_eq!(msg.topic, "device/sensor1");
        assert_eq!(msg.fields.len(), 2);
        assert_eq!(msg.fields["temperature"], serde_json::json!(30));
    }

    #[test]
    fn rejects_non_object_payload() {
        let err = TopicMessage::decode("device/x", b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, TransportError::InvalidPayload { .. }));
    }

    #[test]
    fn rejects_unparseable_payload() {
        let err = TopicMessage::decode("device/x", b"\x00\x01not json").unwrap_err();
        assert!(matches!(err, TransportError::InvalidPayload { .. }));
    }
}
