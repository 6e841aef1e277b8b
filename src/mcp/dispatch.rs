// SPDX-License-Identifier: MIT

/// MCP `tools/call` dispatcher — validates arguments, routes to the mailbox
/// kernel, and shapes results and errors for the wire.
///
/// The caller's identity comes from the kernel context resolved at startup,
/// never from the request payload. Every dispatch refreshes the calling
/// agent's `last_seen` (best-effort — a failed touch never fails the call).
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::warn;

use crate::mailbox::error::MailError;
use crate::mailbox::kernel::{
    ArchiveMessageArgs, CheckMailArgs, DeleteMessageArgs, GetThreadArgs, ListAgentsArgs, Mailbox,
    MarkReadArgs, ReadMessageArgs, SearchArgs, SendMailArgs, StatsArgs,
};
use crate::mcp::transport::{
    McpError, MCP_INVALID_PARAMS, MCP_NOT_AUTHORIZED, MCP_NOT_FOUND, MCP_RECIPIENT_NOT_FOUND,
    MCP_REPLY_TARGET_NOT_FOUND, MCP_STORAGE_FAILURE,
};

pub struct Dispatcher {
    mailbox: Mailbox,
}

impl Dispatcher {
    pub fn new(mailbox: Mailbox) -> Self {
        Self { mailbox }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Dispatch a `tools/call` invocation.
    ///
    /// `tool_name` — the `name` field from the `tools/call` params.
    /// `arguments` — the `arguments` object (missing object = `{}`).
    ///
    /// Returns the structured result on success. Human-readable rendering is
    /// layered on top by the transport (`mcp::render`), not here.
    pub async fn dispatch(&self, tool_name: &str, arguments: Value) -> Result<Value, MailError> {
        // Presence: each tool call proves the agent is alive.
        if let Err(e) = self
            .mailbox
            .storage()
            .touch_agent(self.mailbox.agent_name(), self.mailbox.machine_id())
            .await
        {
            warn!(kind = e.kind(), "failed to refresh last_seen");
        }

        match tool_name {
            "send_mail" => {
                let args: SendMailArgs = parse_args(arguments)?;
                let receipt = self.mailbox.send_mail(args).await?;
                Ok(shape(&receipt))
            }
            "check_mail" => {
                let args: CheckMailArgs = parse_args(arguments)?;
                let messages = self.mailbox.check_mail(args).await?;
                Ok(json!({ "count": messages.len(), "messages": messages }))
            }
            "read_message" => {
                let args: ReadMessageArgs = parse_args(arguments)?;
                let message = self.mailbox.read_message(args).await?;
                Ok(shape(&message))
            }
            "search_messages" => {
                let args: SearchArgs = parse_args(arguments)?;
                let messages = self.mailbox.search_messages(args).await?;
                Ok(json!({ "count": messages.len(), "messages": messages }))
            }
            "list_agents" => {
                let args: ListAgentsArgs = parse_args(arguments)?;
                let agents = self.mailbox.list_agents(args).await?;
                Ok(json!({ "count": agents.len(), "agents": agents }))
            }
            "mark_read" => {
                let args: MarkReadArgs = parse_args(arguments)?;
                let n = self.mailbox.mark_read(args).await?;
                Ok(json!({ "marked_read": n }))
            }
            "archive_message" => {
                let args: ArchiveMessageArgs = parse_args(arguments)?;
                let id = args.message_id.clone();
                self.mailbox.archive_message(args).await?;
                Ok(json!({ "archived": true, "id": id }))
            }
            "get_thread" => {
                let args: GetThreadArgs = parse_args(arguments)?;
                let thread_id = args.thread_id.clone();
                let messages = self.mailbox.get_thread(args).await?;
                Ok(json!({
                    "thread_id": thread_id,
                    "count": messages.len(),
                    "messages": messages,
                }))
            }
            "get_mailbox_stats" => {
                let _args: StatsArgs = parse_args(arguments)?;
                let stats = self.mailbox.get_mailbox_stats().await?;
                Ok(shape(&stats))
            }
            "delete_message" => {
                let args: DeleteMessageArgs = parse_args(arguments)?;
                let id = args.message_id.clone();
                self.mailbox.delete_message(args).await?;
                Ok(json!({ "deleted": true, "id": id }))
            }
            // Unknown tool names are invalid params on the tools/call
            // request; -32601 is reserved for unknown JSON-RPC methods.
            other => Err(MailError::invalid(
                "tool",
                format!("unknown tool: {other}"),
            )),
        }
    }
}

/// Deserialize a tool's argument object into its typed struct. Serde rejects
/// unknown fields and bad enum values; its message names the offender.
fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, MailError> {
    let arguments = if arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| MailError::InvalidArgument {
        field: "arguments".to_string(),
        reason: e.to_string(),
    })
}

fn shape<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Map a kernel error onto a JSON-RPC error object.
///
/// Storage details are logged here and replaced with a generic message —
/// raw store errors never reach the caller.
pub fn error_to_mcp(err: &MailError) -> McpError {
    let code = match err {
        MailError::InvalidArgument { .. } => MCP_INVALID_PARAMS,
        MailError::RecipientNotFound(_) => MCP_RECIPIENT_NOT_FOUND,
        MailError::ReplyTargetNotFound(_) => MCP_REPLY_TARGET_NOT_FOUND,
        MailError::NotAuthorized => MCP_NOT_AUTHORIZED,
        MailError::NotFound => MCP_NOT_FOUND,
        MailError::Storage(_) => MCP_STORAGE_FAILURE,
    };
    match err {
        MailError::Storage(detail) => {
            tracing::error!(kind = err.kind(), detail = %detail, "storage failure");
            McpError::new(code, "storage failure — transient, retrying may succeed")
        }
        other => McpError::new(code, other.to_string()),
    }
}
