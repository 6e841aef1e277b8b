// SPDX-License-Identifier: MIT
// MCP server over stdio.
//
// Exposes:
//   - transport — JSON-RPC 2.0 wire types and lifecycle handlers
//   - tools     — the tool catalogue (tools/list)
//   - dispatch  — argument validation + routing to the mailbox kernel
//   - render    — human-readable result text (presentation only)

pub mod dispatch;
pub mod render;
pub mod tools;
pub mod transport;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::mailbox::kernel::Mailbox;
use crate::MailContext;
use dispatch::Dispatcher;
use transport::{
    McpError, McpMessage, McpResponse, MCP_INVALID_PARAMS, MCP_METHOD_NOT_FOUND, MCP_PARSE_ERROR,
};

/// Heartbeat period for the current agent's `last_seen` refresh.
const HEARTBEAT_SECS: u64 = 30;

// ─── Server loop ──────────────────────────────────────────────────────────────

/// Serve tool calls over stdin/stdout until EOF or a shutdown signal.
///
/// One JSON-RPC message per line. Responses are written in call order; the
/// kernel itself is reentrant, so interleaving is a transport choice. Logs go
/// to stderr only — stdout belongs to the protocol.
pub async fn run(ctx: MailContext) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(Mailbox::new(
        ctx.storage.clone(),
        ctx.agent_name.clone(),
        ctx.machine_id.clone(),
    ));

    let heartbeat = spawn_heartbeat(ctx.clone());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    info!(agent = %ctx.agent_name, "mail server ready, serving tools over stdio");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(resp) = handle_line(&dispatcher, line).await {
                            let mut payload = serde_json::to_string(&resp)?;
                            payload.push('\n');
                            stdout.write_all(payload.as_bytes()).await?;
                            stdout.flush().await?;
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(err = %e, "stdin read error");
                        break;
                    }
                }
            }
        }
    }

    // Stop the ticker before the final presence write so the two cannot race.
    heartbeat.abort();
    if let Err(e) = ctx
        .storage
        .mark_agent_offline(&ctx.agent_name, &ctx.machine_id)
        .await
    {
        warn!(kind = e.kind(), "failed to mark agent offline");
    }
    ctx.storage.close().await;
    info!("mail server stopped");
    Ok(())
}

/// Parse one line and produce a response, or `None` for notifications.
async fn handle_line(dispatcher: &Dispatcher, line: &str) -> Option<McpResponse> {
    let msg: McpMessage = match serde_json::from_str(line) {
        Ok(m) => m,
        Err(e) => {
            return Some(McpResponse::error(
                Value::Null,
                McpError::new(MCP_PARSE_ERROR, format!("parse error: {e}")),
            ));
        }
    };
    handle_message(dispatcher, msg).await
}

/// Route a parsed message. Requests get a response; notifications do not.
pub async fn handle_message(dispatcher: &Dispatcher, msg: McpMessage) -> Option<McpResponse> {
    match (msg.method.as_str(), msg.id) {
        ("initialize", Some(id)) => Some(transport::handle_initialize(id)),
        ("ping", Some(id)) => Some(transport::handle_ping(id)),
        ("tools/list", Some(id)) => Some(McpResponse::ok(id, tools::handle_tools_list())),
        ("tools/call", Some(id)) => Some(handle_tools_call(dispatcher, id, msg.params).await),
        ("notifications/initialized", None) => {
            transport::handle_initialized();
            None
        }
        (method, None) => {
            debug!(method, "ignoring unknown notification");
            None
        }
        (method, Some(id)) => Some(McpResponse::error(
            id,
            McpError::new(MCP_METHOD_NOT_FOUND, format!("unknown method: {method}")),
        )),
    }
}

async fn handle_tools_call(dispatcher: &Dispatcher, id: Value, params: Option<Value>) -> McpResponse {
    let params = params.unwrap_or(Value::Null);
    let name = match params.get("name").and_then(Value::as_str) {
        Some(n) => n,
        None => {
            return McpResponse::error(
                id,
                McpError::new(MCP_INVALID_PARAMS, "missing required field 'name'"),
            );
        }
    };
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    match dispatcher.dispatch(name, arguments).await {
        Ok(result) => {
            let text = render::render(name, &result);
            McpResponse::ok(
                id,
                json!({
                    "content": [{ "type": "text", "text": text }],
                    "structuredContent": result,
                }),
            )
        }
        Err(e) => {
            warn!(tool = name, kind = e.kind(), "tool call failed");
            McpResponse::error(id, dispatch::error_to_mcp(&e))
        }
    }
}

// ─── Lifecycle ────────────────────────────────────────────────────────────────

/// Refresh the serving agent's `last_seen` every [`HEARTBEAT_SECS`].
///
/// Registration already wrote a fresh timestamp, so the immediate first tick
/// is skipped. The task is aborted during shutdown, before the final
/// offline write.
fn spawn_heartbeat(ctx: MailContext) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_SECS));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = ctx
                .storage
                .touch_agent(&ctx.agent_name, &ctx.machine_id)
                .await
            {
                warn!(kind = e.kind(), "heartbeat failed");
            }
        }
    })
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM and Ctrl-C; elsewhere Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(err = %e, "failed to register SIGTERM handler; Ctrl-C only");
                tokio::signal::ctrl_c().await.ok();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
