use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall lifecycle status of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// No run has been started and no event has been seen.
    #[default]
    Draft,
    /// The backend accepted the run but has not reported anything yet.
    Pending,
    /// Events are flowing.
    InProgress,
    /// The run is in progress but gated on a human decision.
    AwaitingFeedback,
    /// Paused by the human.
    Paused,
    /// Terminal: the backend delivered the final analysis.
    Completed,
    /// Terminal: the backend reported an error.
    Error,
    /// Terminal: stopped by the human.
    Stopped,
}

impl WorkflowStatus {
    /// Returns true if no further transition may leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }

    /// Returns the wire/display name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::AwaitingFeedback => "awaiting_feedback",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    /// Maps an analysis status string reported by the REST API.
    ///
    /// The API reports failures as `failed`; both spellings map to `Error`.
    pub fn from_backend(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending" | "initializing" => Some(Self::Pending),
            "in_progress" | "running" | "analyzing" => Some(Self::InProgress),
            "awaiting_feedback" => Some(Self::AwaitingFeedback),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "error" | "failed" => Some(Self::Error),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Error.is_terminal());
        assert!(WorkflowStatus::Stopped.is_terminal());
        assert!(!WorkflowStatus::Paused.is_terminal());
        assert!(!WorkflowStatus::AwaitingFeedback.is_terminal());
    }

    #[test]
    fn test_from_backend() {
        assert_eq!(
            WorkflowStatus::from_backend("failed"),
            Some(WorkflowStatus::Error)
        );
        assert_eq!(
            WorkflowStatus::from_backend("IN_PROGRESS"),
            Some(WorkflowStatus::InProgress)
        );
        assert_eq!(WorkflowStatus::from_backend("archived"), None);
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&WorkflowStatus::AwaitingFeedback).unwrap();
        assert_eq!(json, "\"awaiting_feedback\"");
    }
}
