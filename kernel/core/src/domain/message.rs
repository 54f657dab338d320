// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Message
//!
//! The wire envelope exchanged between the gateway and operator clients.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Schema for `{type, id, timestamp, payload}` frames

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Closed set of wire message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Thought,
    ToolCall,
    ToolResult,
    ApprovalRequest,
    ApprovalResponse,
    Bankrupt,
    Panic,
    Chat,
    Status,
}

impl MessageType {
    pub const ALL: [MessageType; 9] = [
        MessageType::Thought,
        MessageType::ToolCall,
        MessageType::ToolResult,
        MessageType::ApprovalRequest,
        MessageType::ApprovalResponse,
        MessageType::Bankrupt,
        MessageType::Panic,
        MessageType::Chat,
        MessageType::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Thought => "thought",
            MessageType::ToolCall => "tool_call",
            MessageType::ToolResult => "tool_result",
            MessageType::ApprovalRequest => "approval_request",
            MessageType::ApprovalResponse => "approval_response",
            MessageType::Bankrupt => "bankrupt",
            MessageType::Panic => "panic",
            MessageType::Chat => "chat",
            MessageType::Status => "status",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol envelope. Constructed by the sender, validated by the receiver,
/// never mutated in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub id: String,
    /// Kept as sent; checked as an RFC 3339 date-time with a `T` separator.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: String,
    pub payload: Map<String, Value>,
}

impl WireMessage {
    /// Build an outbound message with a fresh id and the current time.
    pub fn new(message_type: MessageType, payload: Map<String, Value>) -> Self {
        Self {
            message_type,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            payload,
        }
    }

    /// Validate an untyped JSON value against the wire schema.
    pub fn validate(raw: &Value) -> Result<Self, MessageValidationError> {
        if !raw.is_object() {
            return Err(MessageValidationError::NotAnObject);
        }
        WireMessage::deserialize(raw).map_err(|e| MessageValidationError::Schema(e.to_string()))
    }
}

/// `YYYY-MM-DDTHH:MM:SS[.fff](Z|±HH:MM)`. Space-separated forms are rejected.
pub fn is_iso_datetime(text: &str) -> bool {
    text.as_bytes().get(10) == Some(&b'T') && DateTime::parse_from_rfc3339(text).is_ok()
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    if is_iso_datetime(&text) {
        Ok(text)
    } else {
        Err(serde::de::Error::custom(format!("invalid datetime '{text}'")))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageValidationError {
    #[error("Invalid message: expected a JSON object")]
    NotAnObject,

    #[error("Invalid message: {0}")]
    Schema(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_accepts_well_formed_message() {
        let raw = json!({
            "type": "tool_call",
            "id": "msg-1",
            "timestamp": "2026-01-15T10:30:00.000Z",
            "payload": {"tool": "search"}
        });

        let message = WireMessage::validate(&raw).unwrap();
        assert_eq!(message.message_type, MessageType::ToolCall);
        assert_eq!(message.id, "msg-1");
        assert_eq!(message.payload.get("tool"), Some(&json!("search")));
    }

    #[test]
    fn test_validate_rejects_unknown_type() {
        let raw = json!({
            "type": "telepathy",
            "id": "msg-1",
            "timestamp": "2026-01-15T10:30:00Z",
            "payload": {}
        });
        assert!(matches!(
            WireMessage::validate(&raw),
            Err(MessageValidationError::Schema(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_timestamp_and_payload() {
        let bad_timestamp = json!({
            "type": "chat",
            "id": "msg-1",
            "timestamp": "yesterday",
            "payload": {}
        });
        assert!(WireMessage::validate(&bad_timestamp).is_err());

        let bad_payload = json!({
            "type": "chat",
            "id": "msg-1",
            "timestamp": "2026-01-15T10:30:00Z",
            "payload": ["not", "a", "map"]
        });
        assert!(WireMessage::validate(&bad_payload).is_err());

        let numeric_id = json!({
            "type": "chat",
            "id": 7,
            "timestamp": "2026-01-15T10:30:00Z",
            "payload": {}
        });
        assert!(WireMessage::validate(&numeric_id).is_err());
    }

    #[test]
    fn test_timestamp_text_is_preserved() {
        let raw = json!({
            "type": "chat",
            "id": "msg-2",
            "timestamp": "2026-01-15T10:30:00.000+02:00",
            "payload": {}
        });

        let message = WireMessage::validate(&raw).unwrap();
        assert_eq!(message.timestamp, "2026-01-15T10:30:00.000+02:00");
        assert_eq!(serde_json::to_value(&message).unwrap(), raw);
    }

    #[test]
    fn test_space_separated_timestamp_rejected() {
        let raw = json!({
            "type": "chat",
            "id": "msg-3",
            "timestamp": "2026-01-15 10:30:00Z",
            "payload": {}
        });
        assert!(matches!(
            WireMessage::validate(&raw),
            Err(MessageValidationError::Schema(_))
        ));
        assert!(!is_iso_datetime("2026-01-15"));
        assert!(is_iso_datetime("2026-01-15T10:30:00Z"));
    }

    #[test]
    fn test_new_message_has_valid_timestamp() {
        let message = WireMessage::new(MessageType::Status, Map::new());
        assert!(is_iso_datetime(&message.timestamp));
        assert!(message.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_validate_rejects_non_objects() {
        assert_eq!(
            WireMessage::validate(&json!("chat")),
            Err(MessageValidationError::NotAnObject)
        );
    }

    #[test]
    fn test_type_names_match_wire_format() {
        for message_type in MessageType::ALL {
            let encoded = serde_json::to_value(message_type).unwrap();
            assert_eq!(encoded, json!(message_type.as_str()));
        }
    }
}
