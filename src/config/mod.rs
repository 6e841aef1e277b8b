// SPDX-License-Identifier: MIT

use std::path::PathBuf;

/// Server configuration resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Directory holding `mailbox.db` (and its WAL companion files).
    pub data_dir: PathBuf,
    /// Log filter string passed to `tracing_subscriber::EnvFilter`.
    pub log: String,
}

impl MailConfig {
    pub fn new(data_dir: Option<PathBuf>, log: String) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        Self { data_dir, log }
    }
}

/// Default data directory: `~/.ai_mail`.
///
/// Overridable via `--data-dir` / `AI_MAIL_DATA_DIR` (wired in main).
fn default_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ai_mail");
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(profile) = std::env::var("USERPROFILE") {
            return PathBuf::from(profile).join(".ai_mail");
        }
    }
    // Fallback for environments without a home directory.
    PathBuf::from(".ai_mail")
}
