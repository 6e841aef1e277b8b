// SPDX-License-Identifier: MIT

/// Human-readable rendering of structured tool results.
///
/// Presentation only: the structured value is always returned alongside the
/// text, and nothing here feeds back into the kernel. Callers that want
/// machine-readable data use `structuredContent`.
use serde_json::Value;

const PREVIEW_LEN: usize = 100;

/// Render a one-or-more-line text block for a successful tool result.
pub fn render(tool_name: &str, result: &Value) -> String {
    match tool_name {
        "send_mail" => format!(
            "Message sent to {} (id {}, priority {})",
            str_of(result, "recipient"),
            str_of(result, "id"),
            str_of(result, "priority"),
        ),
        "check_mail" => render_message_list(result, "No messages."),
        "read_message" => render_full_message(result),
        "search_messages" => render_message_list(result, "No matching messages."),
        "list_agents" => render_agents(result),
        "mark_read" => format!(
            "Marked {} message(s) as read.",
            result.get("marked_read").and_then(Value::as_u64).unwrap_or(0)
        ),
        "archive_message" => format!("Archived message {}.", str_of(result, "id")),
        "get_thread" => render_thread(result),
        "get_mailbox_stats" => render_stats(result),
        "delete_message" => format!("Deleted message {}.", str_of(result, "id")),
        _ => result.to_string(),
    }
}

fn render_message_list(result: &Value, empty: &str) -> String {
    let messages = list_of(result, "messages");
    if messages.is_empty() {
        return empty.to_string();
    }
    let mut out = format!("{} message(s):\n", messages.len());
    for (i, msg) in messages.iter().enumerate() {
        let read = if msg.get("read").and_then(Value::as_bool).unwrap_or(false) {
            "read"
        } else {
            "unread"
        };
        out.push_str(&format!(
            "\n{}. [{}] {} — from {} ({})\n   id: {}\n   {}\n",
            i + 1,
            str_of(msg, "priority"),
            str_of(msg, "subject"),
            str_of(msg, "sender"),
            read,
            str_of(msg, "id"),
            preview(str_of(msg, "body")),
        ));
    }
    out.push_str("\nUse read_message with an id to view full content.");
    out
}

fn render_full_message(msg: &Value) -> String {
    let mut out = format!(
        "From: {}\nSubject: {}\nTime: {}\nPriority: {}\n",
        str_of(msg, "sender"),
        str_of(msg, "subject"),
        str_of(msg, "timestamp"),
        str_of(msg, "priority"),
    );
    let tags = list_of(msg, "tags");
    if !tags.is_empty() {
        let tags: Vec<&str> = tags.iter().filter_map(Value::as_str).collect();
        out.push_str(&format!("Tags: {}\n", tags.join(", ")));
    }
    if let Some(reply_to) = msg.get("reply_to").and_then(Value::as_str) {
        out.push_str(&format!("In reply to: {reply_to}\n"));
    }
    out.push_str(&format!("Thread: {}\n\n{}", str_of(msg, "thread_id"), str_of(msg, "body")));
    out
}

fn render_agents(result: &Value) -> String {
    let agents = list_of(result, "agents");
    if agents.is_empty() {
        return "No agents registered.".to_string();
    }
    let mut out = format!("{} registered agent(s):\n", agents.len());
    for agent in agents {
        out.push_str(&format!(
            "\n{} [{}] — last seen {}",
            str_of(agent, "name"),
            str_of(agent, "status"),
            str_of(agent, "last_seen"),
        ));
    }
    out
}

fn render_thread(result: &Value) -> String {
    let messages = list_of(result, "messages");
    let mut out = format!(
        "Thread {} ({} message(s)):\n",
        str_of(result, "thread_id"),
        messages.len(),
    );
    for (i, msg) in messages.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {} -> {}: {}\n   {}\n",
            i + 1,
            str_of(msg, "sender"),
            str_of(msg, "recipient"),
            str_of(msg, "subject"),
            preview(str_of(msg, "body")),
        ));
    }
    out
}

fn render_stats(stats: &Value) -> String {
    format!(
        "Inbox: {} total, {} unread ({} urgent). {} agent(s) registered, {} thread(s) involving you.",
        num_of(stats, "total_inbox"),
        num_of(stats, "unread_inbox"),
        num_of(stats, "unread_urgent"),
        num_of(stats, "agents_total"),
        num_of(stats, "distinct_threads_for_agent"),
    )
}

// ─── Field helpers ────────────────────────────────────────────────────────────

fn str_of<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or("")
}

fn num_of(v: &Value, key: &str) -> i64 {
    v.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn list_of<'a>(v: &'a Value, key: &str) -> &'a [Value] {
    v.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn preview(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(PREVIEW_LEN).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "x".repeat(250);
        assert_eq!(preview(&long).len(), PREVIEW_LEN + 3);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn send_receipt_renders_key_fields() {
        let text = render(
            "send_mail",
            &json!({"id": "m-1", "recipient": "bob", "subject": "s", "priority": "high"}),
        );
        assert!(text.contains("bob"));
        assert!(text.contains("m-1"));
        assert!(text.contains("high"));
    }

    #[test]
    fn empty_inbox_renders_placeholder() {
        let text = render("check_mail", &json!({"count": 0, "messages": []}));
        assert_eq!(text, "No messages.");
    }
}
