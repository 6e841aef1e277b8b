// SPDX-License-Identifier: MIT
// Dispatcher tests: argument schema enforcement, result shapes, error-code
// mapping, and the per-call last_seen touch.

use std::sync::Arc;

use ai_mail::mailbox::error::MailError;
use ai_mail::mailbox::kernel::Mailbox;
use ai_mail::mcp::dispatch::{error_to_mcp, Dispatcher};
use ai_mail::mcp::transport::McpMessage;
use ai_mail::mcp::{handle_message, transport};
use ai_mail::storage::Storage;
use serde_json::{json, Value};

const MID: &str = "test-machine";

async fn setup(agents: &[&str]) -> (tempfile::TempDir, Arc<Storage>) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
    for name in agents {
        storage
            .upsert_agent(name, MID, &serde_json::json!({ "pid": 1 }))
            .await
            .unwrap();
    }
    (dir, storage)
}

fn dispatcher(storage: &Arc<Storage>, agent: &str) -> Dispatcher {
    Dispatcher::new(Mailbox::new(storage.clone(), agent, MID))
}

fn request(method: &str, params: Value) -> McpMessage {
    McpMessage {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(1)),
        method: method.to_string(),
        params: Some(params),
    }
}

// ─── Schema validation ───────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let (_dir, storage) = setup(&["alice", "bob"]).await;
    let d = dispatcher(&storage, "alice");

    let err = d
        .dispatch(
            "send_mail",
            json!({"recipient": "bob", "subject": "s", "body": "b", "cc": "carol"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::InvalidArgument { .. }));
    assert!(err.to_string().contains("cc"));
}

#[tokio::test]
async fn enum_violations_are_invalid_arguments() {
    let (_dir, storage) = setup(&["alice", "bob"]).await;
    let d = dispatcher(&storage, "alice");

    let err = d
        .dispatch(
            "send_mail",
            json!({"recipient": "bob", "subject": "s", "body": "b", "priority": "critical"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::InvalidArgument { .. }));
}

#[tokio::test]
async fn numeric_bounds_name_the_field() {
    let (_dir, storage) = setup(&["alice"]).await;
    let d = dispatcher(&storage, "alice");

    for bad_limit in [0, 101] {
        let err = d
            .dispatch("check_mail", json!({ "limit": bad_limit }))
            .await
            .unwrap_err();
        assert!(
            matches!(err, MailError::InvalidArgument { ref field, .. } if field == "limit"),
            "limit {bad_limit} should be rejected"
        );
    }

    let err = d
        .dispatch("search_messages", json!({"query": "x", "days_back": 400}))
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::InvalidArgument { ref field, .. } if field == "days_back"));

    let err = d
        .dispatch("search_messages", json!({ "query": "" }))
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::InvalidArgument { ref field, .. } if field == "query"));

    let err = d
        .dispatch("mark_read", json!({ "message_ids": [] }))
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::InvalidArgument { ref field, .. } if field == "message_ids"));
}

#[tokio::test]
async fn missing_arguments_object_means_defaults() {
    let (_dir, storage) = setup(&["alice"]).await;
    let d = dispatcher(&storage, "alice");

    let result = d.dispatch("check_mail", Value::Null).await.unwrap();
    assert_eq!(result["count"], 0);

    let result = d.dispatch("get_mailbox_stats", Value::Null).await.unwrap();
    assert_eq!(result["agents_total"], 1);
}

#[tokio::test]
async fn unknown_tool_is_rejected() {
    let (_dir, storage) = setup(&["alice"]).await;
    let d = dispatcher(&storage, "alice");

    let err = d.dispatch("send_pigeon", json!({})).await.unwrap_err();
    assert!(matches!(err, MailError::InvalidArgument { .. }));
}

// ─── Result shapes ───────────────────────────────────────────────────────────

#[tokio::test]
async fn results_preserve_the_structured_record_form() {
    let (_dir, storage) = setup(&["alice", "bob"]).await;
    let alice = dispatcher(&storage, "alice");
    let bob = dispatcher(&storage, "bob");

    let receipt = alice
        .dispatch(
            "send_mail",
            json!({
                "recipient": "bob",
                "subject": "hi",
                "body": "hello",
                "tags": ["greeting"],
            }),
        )
        .await
        .unwrap();
    assert_eq!(receipt["recipient"], "bob");
    assert_eq!(receipt["priority"], "normal");
    let id = receipt["id"].as_str().unwrap().to_string();

    let inbox = bob.dispatch("check_mail", json!({})).await.unwrap();
    assert_eq!(inbox["count"], 1);
    let msg = &inbox["messages"][0];
    assert_eq!(msg["id"], id.as_str());
    assert_eq!(msg["tags"], json!(["greeting"]));
    assert_eq!(msg["read"], false);
    assert_eq!(msg["archived"], false);
    // Millisecond-precision UTC timestamp.
    let ts = msg["timestamp"].as_str().unwrap();
    assert_eq!(ts.len(), "2026-01-01T00:00:00.000Z".len());
    assert!(ts.ends_with('Z'));

    let full = bob
        .dispatch("read_message", json!({ "message_id": id }))
        .await
        .unwrap();
    assert_eq!(full["body"], "hello");
    assert_eq!(full["read"], true);

    let marked = bob
        .dispatch("mark_read", json!({ "message_ids": [id] }))
        .await
        .unwrap();
    assert_eq!(marked["marked_read"], 0);
}

#[tokio::test]
async fn thread_results_carry_the_thread_id() {
    let (_dir, storage) = setup(&["alice", "bob"]).await;
    let alice = dispatcher(&storage, "alice");
    let bob = dispatcher(&storage, "bob");

    let m1 = alice
        .dispatch(
            "send_mail",
            json!({"recipient": "bob", "subject": "Q", "body": "?"}),
        )
        .await
        .unwrap();
    let m2 = bob
        .dispatch(
            "send_mail",
            json!({
                "recipient": "alice",
                "subject": "Re: Q",
                "body": "!",
                "reply_to": m1["id"],
            }),
        )
        .await
        .unwrap();
    assert_eq!(m1["thread_id"], m2["thread_id"]);

    let thread = alice
        .dispatch("get_thread", json!({ "thread_id": m1["thread_id"] }))
        .await
        .unwrap();
    assert_eq!(thread["count"], 2);
    assert_eq!(thread["thread_id"], m1["thread_id"]);
    assert_eq!(thread["messages"][0]["id"], m1["id"]);
}

// ─── Error mapping ───────────────────────────────────────────────────────────

#[test]
fn error_codes_follow_the_taxonomy() {
    let cases = [
        (
            MailError::invalid("limit", "out of range"),
            transport::MCP_INVALID_PARAMS,
        ),
        (
            MailError::RecipientNotFound("x".into()),
            transport::MCP_RECIPIENT_NOT_FOUND,
        ),
        (
            MailError::ReplyTargetNotFound("x".into()),
            transport::MCP_REPLY_TARGET_NOT_FOUND,
        ),
        (MailError::NotAuthorized, transport::MCP_NOT_AUTHORIZED),
        (MailError::NotFound, transport::MCP_NOT_FOUND),
        (
            MailError::Storage("disk io error: unreachable".into()),
            transport::MCP_STORAGE_FAILURE,
        ),
    ];
    for (err, code) in cases {
        assert_eq!(error_to_mcp(&err).code, code, "wrong code for {err}");
    }
}

#[test]
fn storage_details_never_reach_the_caller() {
    let err = MailError::Storage("no such table: secrets".into());
    let mcp_err = error_to_mcp(&err);
    assert!(!mcp_err.message.contains("secrets"));
}

// ─── Presence touch ──────────────────────────────────────────────────────────

#[tokio::test]
async fn every_dispatch_refreshes_last_seen() {
    let (_dir, storage) = setup(&["alice"]).await;
    let d = dispatcher(&storage, "alice");

    let stale = (chrono::Utc::now() - chrono::Duration::hours(1))
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    sqlx::query("UPDATE agents SET last_seen = ? WHERE name = 'alice'")
        .bind(&stale)
        .execute(&storage.pool())
        .await
        .unwrap();

    d.dispatch("check_mail", json!({})).await.unwrap();

    let alice = storage.find_agent("alice", MID).await.unwrap().unwrap();
    assert!(alice.last_seen > stale);
    assert_eq!(alice.status.as_str(), "online");
}

// ─── Transport routing ───────────────────────────────────────────────────────

#[tokio::test]
async fn initialize_and_tools_list_roundtrip() {
    let (_dir, storage) = setup(&["alice"]).await;
    let d = dispatcher(&storage, "alice");

    let resp = handle_message(&d, request("initialize", json!({})))
        .await
        .unwrap();
    let result = resp.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "ai-mail");

    let resp = handle_message(&d, request("tools/list", json!({})))
        .await
        .unwrap();
    let tools = resp.result.unwrap();
    assert_eq!(tools["tools"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn tools_call_returns_text_and_structured_content() {
    let (_dir, storage) = setup(&["alice", "bob"]).await;
    let d = dispatcher(&storage, "alice");

    let resp = handle_message(
        &d,
        request(
            "tools/call",
            json!({
                "name": "send_mail",
                "arguments": {"recipient": "bob", "subject": "hi", "body": "hello"},
            }),
        ),
    )
    .await
    .unwrap();

    let result = resp.result.unwrap();
    assert_eq!(result["content"][0]["type"], "text");
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("bob"));
    assert_eq!(result["structuredContent"]["recipient"], "bob");
}

#[tokio::test]
async fn unknown_method_and_notifications_are_handled() {
    let (_dir, storage) = setup(&["alice"]).await;
    let d = dispatcher(&storage, "alice");

    let resp = handle_message(&d, request("mailbox/teleport", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.error.unwrap().code, transport::MCP_METHOD_NOT_FOUND);

    let note = McpMessage {
        jsonrpc: "2.0".to_string(),
        id: None,
        method: "notifications/initialized".to_string(),
        params: None,
    };
    assert!(handle_message(&d, note).await.is_none());
}

#[tokio::test]
async fn tools_call_without_a_name_is_invalid() {
    let (_dir, storage) = setup(&["alice"]).await;
    let d = dispatcher(&storage, "alice");

    let resp = handle_message(&d, request("tools/call", json!({"arguments": {}})))
        .await
        .unwrap();
    assert_eq!(resp.error.unwrap().code, transport::MCP_INVALID_PARAMS);
}

#[tokio::test]
async fn kernel_errors_surface_with_their_codes() {
    let (_dir, storage) = setup(&["alice"]).await;
    let d = dispatcher(&storage, "alice");

    let resp = handle_message(
        &d,
        request(
            "tools/call",
            json!({
                "name": "send_mail",
                "arguments": {"recipient": "ghost", "subject": "s", "body": "b"},
            }),
        ),
    )
    .await
    .unwrap();
    assert_eq!(resp.error.unwrap().code, transport::MCP_RECIPIENT_NOT_FOUND);
}
