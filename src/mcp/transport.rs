// SPDX-License-Identifier: MIT

/// MCP JSON-RPC 2.0 wire types and lifecycle handlers.
///
/// The server speaks newline-delimited JSON-RPC over stdio. Notifications
/// (no `id`) use the same wire format but expect no response.
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Core message types ───────────────────────────────────────────────────────

/// An incoming JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpMessage {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 response (success or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    /// Construct a successful response.
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Construct an error response.
    pub fn error(id: Value, error: McpError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

// ─── Error codes ──────────────────────────────────────────────────────────────
//
// Standard JSON-RPC codes plus the mailbox error taxonomy:
//   recipientNotFound   = -32001
//   replyTargetNotFound = -32002
//   notAuthorized       = -32003
//   notFound            = -32004
//   storageFailure      = -32010  (transient — caller may retry)

pub const MCP_PARSE_ERROR: i32 = -32700;
pub const MCP_INVALID_REQUEST: i32 = -32600;
pub const MCP_METHOD_NOT_FOUND: i32 = -32601;
pub const MCP_INVALID_PARAMS: i32 = -32602;
pub const MCP_INTERNAL_ERROR: i32 = -32603;
pub const MCP_RECIPIENT_NOT_FOUND: i32 = -32001;
pub const MCP_REPLY_TARGET_NOT_FOUND: i32 = -32002;
pub const MCP_NOT_AUTHORIZED: i32 = -32003;
pub const MCP_NOT_FOUND: i32 = -32004;
pub const MCP_STORAGE_FAILURE: i32 = -32010;

// ─── Lifecycle types ──────────────────────────────────────────────────────────

/// Server identification block included in `initialize` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    pub name: String,
    pub version: String,
}

/// Response body for the `initialize` RPC method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpInitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Value,
    #[serde(rename = "serverInfo")]
    pub server_info: McpServerInfo,
}

/// Handle an `initialize` request from an MCP client.
pub fn handle_initialize(id: Value) -> McpResponse {
    let result = McpInitializeResult {
        protocol_version: "2025-06-18".into(),
        capabilities: serde_json::json!({
            "tools": { "listChanged": false }
        }),
        server_info: McpServerInfo {
            name: "ai-mail".into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };
    McpResponse::ok(
        id,
        serde_json::to_value(&result).unwrap_or(Value::Null),
    )
}

/// Handle a `ping` request — respond with an empty result.
pub fn handle_ping(id: Value) -> McpResponse {
    McpResponse::ok(id, serde_json::json!({}))
}

/// Handle the `initialized` notification — no response is sent.
pub fn handle_initialized() {
    tracing::debug!("client sent 'initialized' notification — session is ready");
}
