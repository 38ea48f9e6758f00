use thiserror::Error;

use crate::models::{OptionId, PollId};

pub type Result<T> = std::result::Result<T, VoteError>;

/// Failures of a single voting interaction. None of these are fatal to the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Option not found: {0}")]
    OptionNotFound(OptionId),
    #[error("Failed to {action} vote: {reason}")]
    PersistenceFailure { action: VoteAction, reason: String },
    #[error("Permission denied: {0}")]
    AuthorizationDenied(String),
    #[error("Poll {0} is not accepting votes")]
    PollClosed(PollId),
}

/// The kind of write that failed, used to phrase the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
    Cast,
    Update,
    Clear,
}

impl std::fmt::Display for VoteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VoteAction::Cast => "cast",
            VoteAction::Update => "update",
            VoteAction::Clear => "clear",
        })
    }
}

impl VoteError {
    pub fn invalid(message: impl Into<String>) -> Self {
        VoteError::InvalidInput(message.into())
    }

    /// Message shown to the voter. Internal detail stays in the log.
    pub fn user_message(&self) -> String {
        match self {
            VoteError::InvalidInput(_) => "Invalid input".to_string(),
            VoteError::OptionNotFound(_) => "Option not found".to_string(),
            VoteError::PersistenceFailure { action, .. } => format!("Failed to {} vote", action),
            VoteError::AuthorizationDenied(_) => {
                "You don't have permission to do that".to_string()
            }
            VoteError::PollClosed(_) => "This poll is not accepting votes".to_string(),
        }
    }
}
