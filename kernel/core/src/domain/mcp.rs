// Copyright (c) 2026 CrevnClaw Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Mcp
//!
//! Tool server configuration, tool definitions and the JSON-RPC envelope
//! spoken over a tool server's stdin/stdout.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value objects for the [`McpHost`](crate::infrastructure::mcp::McpHost)

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// MCP protocol revision announced during `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Per-request deadline for correlated responses.
pub const MCP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How to launch one tool server subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A tool discovered through `tools/list`, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Normalize one entry of a `tools/list` result. Missing descriptions
    /// become `""` and missing schemas become `{}`.
    pub fn from_listing(entry: &Value) -> Option<Self> {
        let name = entry.get("name")?.as_str()?.to_string();
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let input_schema = entry
            .get("inputSchema")
            .filter(|schema| !schema.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        Some(Self {
            name,
            description,
            input_schema,
        })
    }

    /// Registry key: `<server>:<tool>`.
    pub fn registry_key(server: &str, tool: &str) -> String {
        format!("{server}:{tool}")
    }
}

/// JSON-RPC 2.0 message. Requests carry `id` and `method`, notifications
/// only `method`, responses `id` plus `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    pub fn request(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP server not connected: {0}")]
    NotConnected(String),

    #[error("MCP server already connected: {0}")]
    AlreadyConnected(String),

    #[error("Failed to spawn MCP server {server}: {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MCP request timeout: {method}")]
    Timeout { method: String },

    #[error("MCP error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("MCP transport closed while waiting for {method}")]
    TransportClosed { method: String },

    #[error("MCP I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_definition_defaults() {
        let tool = ToolDefinition::from_listing(&json!({"name": "search"})).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema, json!({}));

        let tool = ToolDefinition::from_listing(&json!({
            "name": "search",
            "description": "Web search",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(tool.description, "Web search");
        assert_eq!(tool.input_schema, json!({"type": "object"}));

        assert!(ToolDefinition::from_listing(&json!({"description": "nameless"})).is_none());
    }

    #[test]
    fn test_notification_has_no_id() {
        let encoded = serde_json::to_value(JsonRpcMessage::notification(
            "notifications/initialized",
            json!({}),
        ))
        .unwrap();
        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized", "params": {}})
        );
    }

    #[test]
    fn test_error_response_parses() {
        let message: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        assert_eq!(message.id, Some(4));
        assert_eq!(message.error.unwrap().code, -32601);
    }
}
