//! Error taxonomy shared across the console.

use crate::WorkflowStatus;
use thiserror::Error;

/// Errors surfaced by the reconstruction engine and its adapters.
///
/// None of these are fatal to a session: the stream keeps flowing and the
/// human can still read the state projected so far.
#[derive(Debug, Error)]
pub enum Error {
    /// A frame was not parseable or had no recognised discriminator.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// A command was issued before the backend acknowledged the subscription.
    #[error("cannot send `{command}` before the case subscription is acknowledged")]
    NotSubscribed { command: &'static str },

    /// A lifecycle command is not permitted in the current status.
    #[error("cannot {action} while the workflow is {status}")]
    InvalidTransition {
        action: &'static str,
        status: WorkflowStatus,
    },

    /// The transport closed underneath the session.
    #[error("connection lost: {reason}")]
    Disconnected { reason: String },

    /// Feedback text was blank.
    #[error("feedback text must not be empty")]
    EmptyFeedback,

    /// A chat message was blank.
    #[error("message text must not be empty")]
    EmptyMessage,

    /// The transport failed to deliver a command.
    #[error("transport error: {0}")]
    Transport(String),

    /// The case/analysis REST collaborator failed.
    #[error("case api error: {0}")]
    Api(String),
}

impl Error {
    /// Returns true if the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NotSubscribed { .. } | Error::Disconnected { .. } | Error::Transport(_)
        )
    }
}

/// Convenience alias used across the Lexwatch crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::NotSubscribed { command: "pause" }.is_retryable());
        assert!(
            Error::Disconnected {
                reason: "closed".into()
            }
            .is_retryable()
        );
        assert!(!Error::EmptyFeedback.is_retryable());
        assert!(
            !Error::InvalidTransition {
                action: "pause",
                status: WorkflowStatus::Completed,
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            action: "resume",
            status: WorkflowStatus::InProgress,
        };
        assert_eq!(
            err.to_string(),
            "cannot resume while the workflow is in_progress"
        );
    }
}
