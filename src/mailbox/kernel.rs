// SPDX-License-Identifier: MIT
// The mailbox kernel: the ten tool operations, executed on behalf of one
// authenticated agent against the shared store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mailbox::error::MailError;
use crate::mailbox::model::{
    now_iso, Agent, MailboxStats, Message, Priority, ACTIVE_WINDOW_SECS,
};
use crate::storage::{InboxFilter, SearchFilter, Storage};

// ─── Argument structs ─────────────────────────────────────────────────────────
//
// Each tool's arguments deserialize into one of these. `deny_unknown_fields`
// rejects stray fields at the schema layer; numeric bounds and non-emptiness
// are checked in the kernel so the offending field can be named.

fn default_true() -> bool {
    true
}
fn default_check_limit() -> u32 {
    10
}
fn default_check_days() -> u32 {
    7
}
fn default_search_limit() -> u32 {
    20
}
fn default_search_days() -> u32 {
    30
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMailArgs {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckMailArgs {
    #[serde(default = "default_true")]
    pub unread_only: bool,
    #[serde(default = "default_check_limit")]
    pub limit: u32,
    #[serde(default)]
    pub priority_filter: Option<Priority>,
    #[serde(default = "default_check_days")]
    pub days_back: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadMessageArgs {
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default = "default_search_days")]
    pub days_back: u32,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ListAgentsArgs {
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadArgs {
    pub message_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveMessageArgs {
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetThreadArgs {
    pub thread_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsArgs {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteMessageArgs {
    pub message_id: String,
}

// ─── Results ──────────────────────────────────────────────────────────────────

/// What `send_mail` returns to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub priority: Priority,
    pub thread_id: String,
}

// ─── Kernel ───────────────────────────────────────────────────────────────────

/// The kernel context: shared store plus the identity of the one agent this
/// context acts for. Caller identity never comes from request payloads.
#[derive(Clone)]
pub struct Mailbox {
    storage: Arc<Storage>,
    agent_name: String,
    machine_id: String,
}

impl Mailbox {
    pub fn new(
        storage: Arc<Storage>,
        agent_name: impl Into<String>,
        machine_id: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            agent_name: agent_name.into(),
            machine_id: machine_id.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // ─── send_mail ────────────────────────────────────────────────────────────

    /// Send a message. Validates the recipient, tag set, and — for replies —
    /// that the caller is a party to the referenced message. Replies join the
    /// referenced message's thread; fresh sends open a new one.
    pub async fn send_mail(&self, args: SendMailArgs) -> Result<SendReceipt, MailError> {
        if args.recipient.is_empty() {
            return Err(MailError::invalid("recipient", "must not be empty"));
        }
        if args.subject.is_empty() {
            return Err(MailError::invalid("subject", "must not be empty"));
        }
        if args.body.is_empty() {
            return Err(MailError::invalid("body", "must not be empty"));
        }
        let tags = normalize_tags(args.tags)?;

        if self
            .storage
            .find_agent_by_name(&args.recipient)
            .await?
            .is_none()
        {
            return Err(MailError::RecipientNotFound(args.recipient));
        }

        let thread_id = match args.reply_to.as_deref() {
            Some(reply_id) => {
                let target = self
                    .storage
                    .get_message_unchecked(reply_id)
                    .await?
                    .ok_or_else(|| MailError::ReplyTargetNotFound(reply_id.to_string()))?;
                if target.sender != self.agent_name && target.recipient != self.agent_name {
                    return Err(MailError::NotAuthorized);
                }
                target.thread_id
            }
            None => Uuid::new_v4().to_string(),
        };

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender: self.agent_name.clone(),
            recipient: args.recipient,
            subject: args.subject,
            body: args.body,
            priority: args.priority,
            tags,
            reply_to: args.reply_to,
            thread_id,
            timestamp: now_iso(),
            read: false,
            archived: false,
        };
        self.storage.put_message(&message).await?;

        tracing::info!(
            id = %message.id,
            recipient = %message.recipient,
            priority = %message.priority,
            thread = %message.thread_id,
            "message sent"
        );

        Ok(SendReceipt {
            id: message.id,
            recipient: message.recipient,
            subject: message.subject,
            priority: message.priority,
            thread_id: message.thread_id,
        })
    }

    // ─── check_mail ───────────────────────────────────────────────────────────

    /// List the caller's inbox: non-archived, within the recency window,
    /// ordered by (priority DESC, timestamp DESC, id ASC). Read-only.
    pub async fn check_mail(&self, args: CheckMailArgs) -> Result<Vec<Message>, MailError> {
        check_limit(args.limit)?;
        if args.days_back < 1 {
            return Err(MailError::invalid("days_back", "must be at least 1"));
        }
        self.storage
            .list_inbox(
                &self.agent_name,
                &InboxFilter {
                    unread_only: args.unread_only,
                    priority: args.priority_filter,
                    days_back: args.days_back,
                    limit: args.limit,
                },
            )
            .await
    }

    // ─── read_message ─────────────────────────────────────────────────────────

    /// Mark a message read and return it in full. Only the recipient can
    /// read; a missing id and someone else's id are the same `NotFound`.
    pub async fn read_message(&self, args: ReadMessageArgs) -> Result<Message, MailError> {
        let transitioned = self
            .storage
            .mark_read(std::slice::from_ref(&args.message_id), &self.agent_name)
            .await?;
        let message = self
            .storage
            .get_message(&args.message_id, &self.agent_name)
            .await?
            .filter(|m| m.recipient == self.agent_name)
            .ok_or(MailError::NotFound)?;
        if transitioned > 0 {
            tracing::debug!(id = %args.message_id, "message marked read");
        }
        Ok(message)
    }

    // ─── search_messages ──────────────────────────────────────────────────────

    /// Substring search (case-insensitive) over subject, body, and tags of
    /// every non-archived message the caller sent or received.
    pub async fn search_messages(&self, args: SearchArgs) -> Result<Vec<Message>, MailError> {
        if args.query.is_empty() {
            return Err(MailError::invalid("query", "must not be empty"));
        }
        check_limit(args.limit)?;
        check_days(args.days_back, 365)?;
        self.storage
            .search(
                &self.agent_name,
                &args.query,
                &SearchFilter {
                    sender: args.sender,
                    priority: args.priority,
                    days_back: args.days_back,
                    limit: args.limit,
                },
            )
            .await
    }

    // ─── list_agents ──────────────────────────────────────────────────────────

    /// All registered agents, most recently seen first. `active_only`
    /// restricts to agents seen within the last hour.
    pub async fn list_agents(&self, args: ListAgentsArgs) -> Result<Vec<Agent>, MailError> {
        let window = args.active_only.then_some(ACTIVE_WINDOW_SECS);
        self.storage.list_agents(window).await
    }

    // ─── mark_read ────────────────────────────────────────────────────────────

    /// Mark a batch of messages read. Not atomic as a set: the returned count
    /// is how many rows actually transitioned.
    pub async fn mark_read(&self, args: MarkReadArgs) -> Result<u64, MailError> {
        if args.message_ids.is_empty() {
            return Err(MailError::invalid("message_ids", "must not be empty"));
        }
        self.storage
            .mark_read(&args.message_ids, &self.agent_name)
            .await
    }

    // ─── archive_message ──────────────────────────────────────────────────────

    /// Archive a message out of the inbox. Idempotent for the recipient;
    /// `NotFound` for anyone else (or for a missing id).
    pub async fn archive_message(&self, args: ArchiveMessageArgs) -> Result<(), MailError> {
        let n = self
            .storage
            .set_archived(&args.message_id, &self.agent_name)
            .await?;
        if n == 0 {
            return Err(MailError::NotFound);
        }
        Ok(())
    }

    // ─── get_thread ───────────────────────────────────────────────────────────

    /// Every message in a thread the caller participates in, oldest first.
    /// An empty result is `NotFound` — the caller either mistyped the id or
    /// is not a party to the conversation, and the two are not distinguished.
    pub async fn get_thread(&self, args: GetThreadArgs) -> Result<Vec<Message>, MailError> {
        let messages = self
            .storage
            .get_thread(&args.thread_id, &self.agent_name)
            .await?;
        if messages.is_empty() {
            return Err(MailError::NotFound);
        }
        Ok(messages)
    }

    // ─── get_mailbox_stats ────────────────────────────────────────────────────

    pub async fn get_mailbox_stats(&self) -> Result<MailboxStats, MailError> {
        self.storage.stats(&self.agent_name).await
    }

    // ─── delete_message ───────────────────────────────────────────────────────

    /// Permanently delete a message from the caller's mailbox.
    pub async fn delete_message(&self, args: DeleteMessageArgs) -> Result<(), MailError> {
        let n = self
            .storage
            .delete(&args.message_id, &self.agent_name)
            .await?;
        if n == 0 {
            return Err(MailError::NotFound);
        }
        tracing::info!(id = %args.message_id, "message deleted");
        Ok(())
    }
}

// ─── Validation helpers ───────────────────────────────────────────────────────

fn check_limit(limit: u32) -> Result<(), MailError> {
    if !(1..=100).contains(&limit) {
        return Err(MailError::invalid("limit", "must be between 1 and 100"));
    }
    Ok(())
}

fn check_days(days: u32, max: u32) -> Result<(), MailError> {
    if !(1..=max).contains(&days) {
        return Err(MailError::invalid(
            "days_back",
            format!("must be between 1 and {max}"),
        ));
    }
    Ok(())
}

/// Tags are a set: reject empties, drop duplicates, keep first-seen order.
fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, MailError> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if tag.is_empty() {
            return Err(MailError::invalid("tags", "tags must be non-empty strings"));
        }
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_deduplicated_in_order() {
        let tags = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(normalize_tags(tags).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn empty_tag_is_rejected() {
        let err = normalize_tags(vec![String::new()]).unwrap_err();
        assert!(matches!(err, MailError::InvalidArgument { .. }));
    }

    #[test]
    fn limit_bounds() {
        assert!(check_limit(1).is_ok());
        assert!(check_limit(100).is_ok());
        assert!(check_limit(0).is_err());
        assert!(check_limit(101).is_err());
    }

    #[test]
    fn check_mail_args_defaults() {
        let args: CheckMailArgs = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(args.unread_only);
        assert_eq!(args.limit, 10);
        assert_eq!(args.days_back, 7);
        assert!(args.priority_filter.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_value::<CheckMailArgs>(serde_json::json!({"bogus": 1}));
        assert!(err.is_err());
    }
}
