// SPDX-License-Identifier: MIT
// Mailbox data model: messages, agents, priorities, stats.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// An agent is considered online if seen within this window.
pub const ONLINE_WINDOW_SECS: i64 = 60;

/// `list_agents(active_only)` uses this wider recency window.
pub const ACTIVE_WINDOW_SECS: i64 = 60 * 60;

// ─── Priority ─────────────────────────────────────────────────────────────────

/// Message priority, totally ordered `urgent > high > normal > low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Canonical string stored in `messages.priority`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    /// Sort rank: lower sorts first in the inbox.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    /// Parse the stored column value. Unknown values (from a hand-edited
    /// database) degrade to `Normal` rather than failing the whole row.
    pub fn from_column(s: &str) -> Self {
        match s {
            "urgent" => Priority::Urgent,
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// A mail message between two agents.
///
/// The envelope is write-once; only `read` and `archived` ever change after
/// insert, and both transitions are one-way (false → true).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub thread_id: String,
    /// RFC 3339 UTC with millisecond precision; fixed-width, so string
    /// comparison is chronological.
    pub timestamp: String,
    pub read: bool,
    pub archived: bool,
}

// ─── Agent ────────────────────────────────────────────────────────────────────

/// Presence status, derived from `last_seen` — the stored column is only a
/// hint and is recomputed on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
        }
    }

    /// Derive presence from a stored `last_seen` timestamp.
    pub fn derive(last_seen: &str, now: DateTime<Utc>) -> Self {
        match DateTime::parse_from_rfc3339(last_seen) {
            Ok(seen) if (now - seen.with_timezone(&Utc)).num_seconds() <= ONLINE_WINDOW_SECS => {
                AgentStatus::Online
            }
            _ => AgentStatus::Offline,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered agent, keyed by `(name, machine_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub machine_id: String,
    pub last_seen: String,
    /// Derived at read time; see [`AgentStatus::derive`].
    pub status: AgentStatus,
    /// Opaque diagnostic blob (pid, platform, version).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_info: Option<serde_json::Value>,
}

// ─── Stats ────────────────────────────────────────────────────────────────────

/// Mailbox counters for one agent, as returned by `get_mailbox_stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxStats {
    pub total_inbox: i64,
    pub unread_inbox: i64,
    pub unread_urgent: i64,
    pub agents_total: i64,
    pub distinct_threads_for_agent: i64,
}

// ─── Time helpers ─────────────────────────────────────────────────────────────

/// Current UTC instant in the canonical stored format.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC instant `days` days ago, in the canonical stored format.
pub fn cutoff_iso(days: u32) -> String {
    (Utc::now() - chrono::Duration::days(i64::from(days)))
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC instant `secs` seconds ago, in the canonical stored format.
pub fn cutoff_secs_iso(secs: i64) -> String {
    (Utc::now() - chrono::Duration::seconds(secs)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_rank_is_total_order() {
        assert!(Priority::Urgent.rank() < Priority::High.rank());
        assert!(Priority::High.rank() < Priority::Normal.rank());
        assert!(Priority::Normal.rank() < Priority::Low.rank());
    }

    #[test]
    fn priority_column_roundtrip() {
        for p in [
            Priority::Urgent,
            Priority::High,
            Priority::Normal,
            Priority::Low,
        ] {
            assert_eq!(Priority::from_column(p.as_str()), p);
        }
    }

    #[test]
    fn unknown_priority_degrades_to_normal() {
        assert_eq!(Priority::from_column("critical"), Priority::Normal);
        assert_eq!(Priority::from_column(""), Priority::Normal);
    }

    #[test]
    fn status_derivation_uses_last_seen() {
        let now = Utc::now();
        let fresh = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let stale = (now - chrono::Duration::seconds(ONLINE_WINDOW_SECS + 5))
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        assert_eq!(AgentStatus::derive(&fresh, now), AgentStatus::Online);
        assert_eq!(AgentStatus::derive(&stale, now), AgentStatus::Offline);
        assert_eq!(AgentStatus::derive("not-a-timestamp", now), AgentStatus::Offline);
    }

    #[test]
    fn now_iso_is_fixed_width_and_sortable() {
        let a = now_iso();
        let b = now_iso();
        assert_eq!(a.len(), "2026-01-01T00:00:00.000Z".len());
        assert!(a <= b);
    }

    #[test]
    fn message_serializes_tags_as_array() {
        let msg = Message {
            id: "m1".into(),
            sender: "alice".into(),
            recipient: "bob".into(),
            subject: "s".into(),
            body: "b".into(),
            priority: Priority::High,
            tags: vec!["task".into(), "build".into()],
            reply_to: None,
            thread_id: "t1".into(),
            timestamp: now_iso(),
            read: false,
            archived: false,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["priority"], "high");
        assert_eq!(v["tags"], serde_json::json!(["task", "build"]));
        assert_eq!(v["read"], false);
        assert!(v.get("reply_to").is_none());
    }
}
