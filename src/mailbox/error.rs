// SPDX-License-Identifier: MIT

/// The error taxonomy every mailbox operation returns.
///
/// Callers (the MCP dispatcher, the CLI) branch on the variant, never on the
/// message text. `Storage` wraps the underlying sqlx error as a short detail
/// string that is logged but not sent to callers verbatim.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// An argument failed schema, bounds, enum, or grammar checks.
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    /// `send_mail` addressed an agent that is not registered.
    #[error("recipient '{0}' is not a registered agent")]
    RecipientNotFound(String),

    /// The `reply_to` id does not reference any stored message.
    #[error("reply target '{0}' does not exist")]
    ReplyTargetNotFound(String),

    /// The operation would touch a message the caller is not a party to.
    #[error("not authorized to access the referenced message")]
    NotAuthorized,

    /// The message or thread does not exist — or exists but is not visible
    /// to the caller. The two cases are deliberately indistinguishable.
    #[error("message or thread not found")]
    NotFound,

    /// Underlying store I/O or constraint violation. Transient; retryable.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl MailError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        MailError::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            MailError::InvalidArgument { .. } => "invalid_argument",
            MailError::RecipientNotFound(_) => "recipient_not_found",
            MailError::ReplyTargetNotFound(_) => "reply_target_not_found",
            MailError::NotAuthorized => "not_authorized",
            MailError::NotFound => "not_found",
            MailError::Storage(_) => "storage_failure",
        }
    }
}

impl From<sqlx::Error> for MailError {
    fn from(e: sqlx::Error) -> Self {
        MailError::Storage(e.to_string())
    }
}
