// SPDX-License-Identifier: MIT

/// MCP `tools/list` handler — the mailbox tool catalogue.
///
/// Each definition follows the JSON Schema convention for `inputSchema`.
/// Agents call `tools/list` to discover the tools, then invoke them via
/// `tools/call` (routed by `mcp::dispatch`). The schemas here mirror the
/// argument structs in `mailbox::kernel` — those are what actually enforce
/// the shapes.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A single MCP tool definition, as returned in `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl McpToolDef {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Returns all mailbox tools.
///
/// A function rather than a static because `serde_json::json!` produces a
/// non-`const` `Value`; the list is small and cheap to allocate.
pub fn mail_tools() -> Vec<McpToolDef> {
    vec![
        // ── send_mail ─────────────────────────────────────────────────────────
        McpToolDef::new(
            "send_mail",
            "Send a mail message to another AI agent on this machine.",
            json!({
                "type": "object",
                "required": ["recipient", "subject", "body"],
                "properties": {
                    "recipient": {
                        "type": "string",
                        "description": "Name of the recipient agent (see list_agents)."
                    },
                    "subject": {
                        "type": "string",
                        "description": "Subject line of the message."
                    },
                    "body": {
                        "type": "string",
                        "description": "Body content of the message."
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["urgent", "high", "normal", "low"],
                        "description": "Message priority level.",
                        "default": "normal"
                    },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional tags for categorizing the message.",
                        "default": []
                    },
                    "reply_to": {
                        "type": "string",
                        "description": "ID of the message this replies to (joins its thread)."
                    }
                },
                "additionalProperties": false
            }),
        ),
        // ── check_mail ────────────────────────────────────────────────────────
        McpToolDef::new(
            "check_mail",
            "Check the inbox for mail addressed to this agent.",
            json!({
                "type": "object",
                "properties": {
                    "unread_only": {
                        "type": "boolean",
                        "description": "Only return unread messages.",
                        "default": true
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of messages to return.",
                        "default": 10,
                        "minimum": 1,
                        "maximum": 100
                    },
                    "priority_filter": {
                        "type": "string",
                        "enum": ["urgent", "high", "normal", "low"],
                        "description": "Only messages with this priority."
                    },
                    "days_back": {
                        "type": "integer",
                        "description": "Only messages from the last N days.",
                        "default": 7,
                        "minimum": 1
                    }
                },
                "additionalProperties": false
            }),
        ),
        // ── read_message ──────────────────────────────────────────────────────
        McpToolDef::new(
            "read_message",
            "Read one message in full and mark it as read.",
            json!({
                "type": "object",
                "required": ["message_id"],
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "ID of the message to read (from check_mail)."
                    }
                },
                "additionalProperties": false
            }),
        ),
        // ── search_messages ───────────────────────────────────────────────────
        McpToolDef::new(
            "search_messages",
            "Search message history by keyword across subject, body, and tags.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Substring to search for (case-insensitive)."
                    },
                    "days_back": {
                        "type": "integer",
                        "description": "Search within the last N days.",
                        "default": 30,
                        "minimum": 1,
                        "maximum": 365
                    },
                    "sender": {
                        "type": "string",
                        "description": "Only messages from this sender."
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["urgent", "high", "normal", "low"],
                        "description": "Only messages with this priority."
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of results.",
                        "default": 20,
                        "minimum": 1,
                        "maximum": 100
                    }
                },
                "additionalProperties": false
            }),
        ),
        // ── list_agents ───────────────────────────────────────────────────────
        McpToolDef::new(
            "list_agents",
            "List agents registered in the mail system and their presence.",
            json!({
                "type": "object",
                "properties": {
                    "active_only": {
                        "type": "boolean",
                        "description": "Only agents seen within the last hour.",
                        "default": false
                    }
                },
                "additionalProperties": false
            }),
        ),
        // ── mark_read ─────────────────────────────────────────────────────────
        McpToolDef::new(
            "mark_read",
            "Mark one or more messages as read without displaying them.",
            json!({
                "type": "object",
                "required": ["message_ids"],
                "properties": {
                    "message_ids": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "description": "IDs of the messages to mark as read."
                    }
                },
                "additionalProperties": false
            }),
        ),
        // ── archive_message ───────────────────────────────────────────────────
        McpToolDef::new(
            "archive_message",
            "Archive a message out of the inbox. Archived messages are kept but no longer listed.",
            json!({
                "type": "object",
                "required": ["message_id"],
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "ID of the message to archive."
                    }
                },
                "additionalProperties": false
            }),
        ),
        // ── get_thread ────────────────────────────────────────────────────────
        McpToolDef::new(
            "get_thread",
            "Get all messages in a conversation thread, oldest first.",
            json!({
                "type": "object",
                "required": ["thread_id"],
                "properties": {
                    "thread_id": {
                        "type": "string",
                        "description": "ID of the thread (found in message details)."
                    }
                },
                "additionalProperties": false
            }),
        ),
        // ── get_mailbox_stats ─────────────────────────────────────────────────
        McpToolDef::new(
            "get_mailbox_stats",
            "Mailbox counters for this agent: inbox totals, unread, urgent unread, agents, threads.",
            json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        ),
        // ── delete_message ────────────────────────────────────────────────────
        McpToolDef::new(
            "delete_message",
            "Permanently delete a message from this agent's mailbox.",
            json!({
                "type": "object",
                "required": ["message_id"],
                "properties": {
                    "message_id": {
                        "type": "string",
                        "description": "ID of the message to delete."
                    }
                },
                "additionalProperties": false
            }),
        ),
    ]
}

/// Handle a `tools/list` request.
pub fn handle_tools_list() -> Value {
    json!({ "tools": mail_tools() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_has_ten_tools_with_schemas() {
        let tools = mail_tools();
        assert_eq!(tools.len(), 10);
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object");
            assert_eq!(tool.input_schema["additionalProperties"], false);
            assert!(!tool.description.is_empty());
        }
    }

    #[test]
    fn tool_names_are_unique() {
        let tools = mail_tools();
        let mut names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 10);
    }
}
