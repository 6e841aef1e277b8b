// SPDX-License-Identifier: MIT
// SQLite persistence for messages and agent registrations.

use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::mailbox::error::MailError;
use crate::mailbox::model::{
    cutoff_iso, cutoff_secs_iso, now_iso, Agent, AgentStatus, MailboxStats, Message, Priority,
    ONLINE_WINDOW_SECS,
};

/// Inbox ordering: priority first, then recency, then id for a stable
/// tiebreak that does not depend on insert order.
const PRIORITY_RANK: &str =
    "CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'normal' THEN 2 ELSE 3 END";

/// Search scans at most this many recent candidate rows before substring
/// matching; older in-window messages beyond the cap are not considered.
const SEARCH_SCAN_CAP: i64 = 1000;

// ─── Raw DB rows ──────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    sender: String,
    recipient: String,
    subject: String,
    body: String,
    priority: String,
    tags: String,
    reply_to: Option<String>,
    thread_id: String,
    timestamp: String,
    read: i64,
    archived: i64,
}

impl From<MessageRow> for Message {
    fn from(r: MessageRow) -> Message {
        Message {
            id: r.id,
            sender: r.sender,
            recipient: r.recipient,
            subject: r.subject,
            body: r.body,
            priority: Priority::from_column(&r.priority),
            tags: serde_json::from_str(&r.tags).unwrap_or_default(),
            reply_to: r.reply_to,
            thread_id: r.thread_id,
            timestamp: r.timestamp,
            read: r.read != 0,
            archived: r.archived != 0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    name: String,
    machine_id: String,
    last_seen: String,
    process_info: Option<String>,
}

impl From<AgentRow> for Agent {
    fn from(r: AgentRow) -> Agent {
        // The stored status column is only a hint; presence is always
        // recomputed from last_seen.
        let status = AgentStatus::derive(&r.last_seen, Utc::now());
        Agent {
            name: r.name,
            machine_id: r.machine_id,
            last_seen: r.last_seen,
            status,
            process_info: r
                .process_info
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
        }
    }
}

// ─── Filters ──────────────────────────────────────────────────────────────────

/// Inbox scan filter (`check_mail`).
#[derive(Debug, Clone)]
pub struct InboxFilter {
    pub unread_only: bool,
    pub priority: Option<Priority>,
    pub days_back: u32,
    pub limit: u32,
}

/// History search filter (`search_messages`).
#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub sender: Option<String>,
    pub priority: Option<Priority>,
    pub days_back: u32,
    pub limit: u32,
}

// ─── Storage ──────────────────────────────────────────────────────────────────

/// SQLite-backed mailbox store.
///
/// One file (`mailbox.db`, WAL journal) holds both relations. All mutating
/// statements that act on behalf of a recipient carry the recipient guard in
/// the WHERE clause, so authorization cannot be bypassed by a buggy caller.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self, MailError> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| MailError::Storage(e.to_string()))?;
        let db_path = data_dir.join("mailbox.db");
        // synchronous=FULL: send_mail must be durable before it returns.
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Full)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), MailError> {
        for stmt in include_str!("migrations/001_init.sql").split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Checkpoint and close the pool. The WAL companion files are cleaned up
    /// by SQLite when the last connection closes.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Return a clone of the connection pool (cheap, Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    // ─── Messages: mutation ───────────────────────────────────────────────────

    /// Persist a new message. Durable before returning.
    pub async fn put_message(&self, m: &Message) -> Result<(), MailError> {
        let tags = serde_json::to_string(&m.tags).map_err(|e| MailError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO messages
                 (id, sender, recipient, subject, body, priority, tags, reply_to, thread_id, timestamp, read, archived)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&m.id)
        .bind(&m.sender)
        .bind(&m.recipient)
        .bind(&m.subject)
        .bind(&m.body)
        .bind(m.priority.as_str())
        .bind(&tags)
        .bind(m.reply_to.as_deref())
        .bind(&m.thread_id)
        .bind(&m.timestamp)
        .bind(if m.read { 1i64 } else { 0i64 })
        .bind(if m.archived { 1i64 } else { 0i64 })
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark messages as read for `recipient`. Returns the number of rows
    /// actually transitioned — the `read = 0` guard keeps already-read and
    /// foreign messages out of the count.
    pub async fn mark_read(&self, ids: &[String], recipient: &str) -> Result<u64, MailError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE messages SET read = 1
             WHERE id IN ({placeholders}) AND recipient = ? AND read = 0"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.bind(recipient).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Archive a message. Idempotent: re-archiving still matches the row, so
    /// the returned count stays 1 for a message the recipient owns.
    pub async fn set_archived(&self, id: &str, recipient: &str) -> Result<u64, MailError> {
        let result =
            sqlx::query("UPDATE messages SET archived = 1 WHERE id = ? AND recipient = ?")
                .bind(id)
                .bind(recipient)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Permanently delete a message the recipient owns.
    pub async fn delete(&self, id: &str, recipient: &str) -> Result<u64, MailError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ? AND recipient = ?")
            .bind(id)
            .bind(recipient)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ─── Messages: queries ────────────────────────────────────────────────────

    /// Fetch a message visible to `viewer` (its sender or recipient).
    pub async fn get_message(
        &self,
        id: &str,
        viewer: &str,
    ) -> Result<Option<Message>, MailError> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT * FROM messages WHERE id = ? AND (sender = ? OR recipient = ?)",
        )
        .bind(id)
        .bind(viewer)
        .bind(viewer)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Fetch a message regardless of viewer. Internal: used for the
    /// reply-target visibility check, where "absent" and "not yours" map to
    /// different errors.
    pub async fn get_message_unchecked(&self, id: &str) -> Result<Option<Message>, MailError> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Non-archived inbox for `recipient`, ordered by
    /// (priority DESC, timestamp DESC, id ASC), bounded by the filter.
    pub async fn list_inbox(
        &self,
        recipient: &str,
        filter: &InboxFilter,
    ) -> Result<Vec<Message>, MailError> {
        let cutoff = cutoff_iso(filter.days_back);
        let mut sql = String::from(
            "SELECT * FROM messages
             WHERE recipient = ? AND archived = 0 AND timestamp >= ?",
        );
        if filter.unread_only {
            sql.push_str(" AND read = 0");
        }
        if filter.priority.is_some() {
            sql.push_str(" AND priority = ?");
        }
        sql.push_str(&format!(
            " ORDER BY {PRIORITY_RANK}, timestamp DESC, id ASC LIMIT ?"
        ));

        let mut query = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(recipient)
            .bind(&cutoff);
        if let Some(p) = filter.priority {
            query = query.bind(p.as_str());
        }
        let rows = query
            .bind(i64::from(filter.limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Case-insensitive substring search over subject, body, and tags for
    /// messages the participant sent or received. Archived rows excluded.
    ///
    /// SQL narrows by the structural filters (participant, window, sender,
    /// priority); the substring match itself runs in Rust. SQLite's LIKE
    /// only case-folds ASCII, so matching at the SQL layer would silently
    /// miss rows like a stored "CAFÉ" for the query "café". The candidate
    /// set is bounded to the [`SEARCH_SCAN_CAP`] most recent in-window rows.
    pub async fn search(
        &self,
        participant: &str,
        q: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<Message>, MailError> {
        let cutoff = cutoff_iso(filter.days_back);
        let mut sql = String::from(
            "SELECT * FROM messages
             WHERE (sender = ? OR recipient = ?) AND archived = 0 AND timestamp >= ?",
        );
        if filter.sender.is_some() {
            sql.push_str(" AND sender = ?");
        }
        if filter.priority.is_some() {
            sql.push_str(" AND priority = ?");
        }
        sql.push_str(" ORDER BY timestamp DESC, id ASC LIMIT ?");

        let mut query = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(participant)
            .bind(participant)
            .bind(&cutoff);
        if let Some(ref sender) = filter.sender {
            query = query.bind(sender);
        }
        if let Some(p) = filter.priority {
            query = query.bind(p.as_str());
        }
        let rows = query.bind(SEARCH_SCAN_CAP).fetch_all(&self.pool).await?;

        let needle = q.to_lowercase();
        Ok(rows
            .into_iter()
            .map(Message::from)
            .filter(|m| {
                m.subject.to_lowercase().contains(&needle)
                    || m.body.to_lowercase().contains(&needle)
                    || m.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .take(filter.limit as usize)
            .collect())
    }

    /// All messages in a thread the participant is a party to, oldest first.
    pub async fn get_thread(
        &self,
        thread_id: &str,
        participant: &str,
    ) -> Result<Vec<Message>, MailError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM messages
             WHERE thread_id = ? AND (sender = ? OR recipient = ?)
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(thread_id)
        .bind(participant)
        .bind(participant)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Mailbox counters for one agent.
    pub async fn stats(&self, agent: &str) -> Result<MailboxStats, MailError> {
        let total_inbox: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE recipient = ? AND archived = 0",
        )
        .bind(agent)
        .fetch_one(&self.pool)
        .await?;

        let unread_inbox: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE recipient = ? AND archived = 0 AND read = 0",
        )
        .bind(agent)
        .fetch_one(&self.pool)
        .await?;

        let unread_urgent: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages
             WHERE recipient = ? AND archived = 0 AND read = 0 AND priority = 'urgent'",
        )
        .bind(agent)
        .fetch_one(&self.pool)
        .await?;

        let agents_total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agents")
            .fetch_one(&self.pool)
            .await?;

        let distinct_threads: (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT thread_id) FROM messages WHERE sender = ? OR recipient = ?",
        )
        .bind(agent)
        .bind(agent)
        .fetch_one(&self.pool)
        .await?;

        Ok(MailboxStats {
            total_inbox: total_inbox.0,
            unread_inbox: unread_inbox.0,
            unread_urgent: unread_urgent.0,
            agents_total: agents_total.0,
            distinct_threads_for_agent: distinct_threads.0,
        })
    }

    // ─── Agents ───────────────────────────────────────────────────────────────

    /// Register or refresh an agent row for `(name, machine_id)`.
    pub async fn upsert_agent(
        &self,
        name: &str,
        machine_id: &str,
        process_info: &serde_json::Value,
    ) -> Result<(), MailError> {
        let now = now_iso();
        let info = process_info.to_string();
        sqlx::query(
            "INSERT INTO agents (name, machine_id, last_seen, status, process_info)
             VALUES (?, ?, ?, 'online', ?)
             ON CONFLICT(name, machine_id) DO UPDATE SET
               last_seen = excluded.last_seen,
               status = excluded.status,
               process_info = excluded.process_info",
        )
        .bind(name)
        .bind(machine_id)
        .bind(&now)
        .bind(&info)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Refresh `last_seen` for an agent (tool-call touch and heartbeat).
    pub async fn touch_agent(&self, name: &str, machine_id: &str) -> Result<(), MailError> {
        let now = now_iso();
        sqlx::query(
            "UPDATE agents SET last_seen = ?, status = 'online'
             WHERE name = ? AND machine_id = ?",
        )
        .bind(&now)
        .bind(name)
        .bind(machine_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Graceful-shutdown write: final `last_seen` plus the offline hint.
    pub async fn mark_agent_offline(&self, name: &str, machine_id: &str) -> Result<(), MailError> {
        let now = now_iso();
        sqlx::query(
            "UPDATE agents SET last_seen = ?, status = 'offline'
             WHERE name = ? AND machine_id = ?",
        )
        .bind(&now)
        .bind(name)
        .bind(machine_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_agent(
        &self,
        name: &str,
        machine_id: &str,
    ) -> Result<Option<Agent>, MailError> {
        let row: Option<AgentRow> =
            sqlx::query_as("SELECT * FROM agents WHERE name = ? AND machine_id = ?")
                .bind(name)
                .bind(machine_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    /// Recipient lookup is by name alone — names are host-unique (single-host
    /// scope), so any matching row proves the recipient exists.
    pub async fn find_agent_by_name(&self, name: &str) -> Result<Option<Agent>, MailError> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE name = ? LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// All agents, most recently seen first. With `only_recent_secs`, only
    /// agents seen within that window.
    pub async fn list_agents(
        &self,
        only_recent_secs: Option<i64>,
    ) -> Result<Vec<Agent>, MailError> {
        let rows: Vec<AgentRow> = if let Some(secs) = only_recent_secs {
            let cutoff = cutoff_secs_iso(secs);
            sqlx::query_as(
                "SELECT * FROM agents WHERE last_seen >= ? ORDER BY last_seen DESC",
            )
            .bind(&cutoff)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT * FROM agents ORDER BY last_seen DESC")
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ─── Maintenance ──────────────────────────────────────────────────────────

    /// After an abrupt shutdown the status column may still claim `online`
    /// for long-gone agents. Readers never trust it, but repairing it once
    /// at startup keeps ad-hoc inspection of the database honest.
    pub async fn normalize_stale_presence(&self) -> Result<u64, MailError> {
        let cutoff = cutoff_secs_iso(ONLINE_WINDOW_SECS);
        let result = sqlx::query(
            "UPDATE agents SET status = 'offline' WHERE status = 'online' AND last_seen < ?",
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete archived messages older than `days` days. Returns the count.
    pub async fn prune_archived(&self, days: u32) -> Result<u64, MailError> {
        let cutoff = cutoff_iso(days);
        let result = sqlx::query("DELETE FROM messages WHERE archived = 1 AND timestamp < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete agent registrations not seen for `days` days.
    pub async fn prune_stale_agents(&self, days: u32) -> Result<u64, MailError> {
        let cutoff = cutoff_iso(days);
        let result = sqlx::query("DELETE FROM agents WHERE last_seen < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

