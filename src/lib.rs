// SPDX-License-Identifier: MIT

//! Local inter-agent mailbox.
//!
//! AI agents on one host exchange addressed, threaded, prioritized messages
//! through a shared SQLite-backed store, served over a stdio MCP tool
//! protocol. The mailbox kernel ([`mailbox::kernel::Mailbox`]) owns the
//! semantics; the MCP layer ([`mcp`]) is a thin adapter that validates,
//! routes, and renders.

pub mod config;
pub mod identity;
pub mod mailbox;
pub mod mcp;
pub mod storage;

use std::sync::Arc;

use config::MailConfig;
use storage::Storage;

/// Shared state for the serving process: the open store plus the identity
/// this process registered at startup. Cloned into the heartbeat task and
/// the dispatcher; nothing here is a global.
#[derive(Clone)]
pub struct MailContext {
    pub config: Arc<MailConfig>,
    pub storage: Arc<Storage>,
    /// Unique agent name allocated at startup (after collision resolution).
    pub agent_name: String,
    /// Stable host fingerprint; the uniqueness scope for agent names.
    pub machine_id: String,
}
