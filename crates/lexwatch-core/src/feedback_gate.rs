//! Human-in-the-loop feedback gate.

use lexwatch_proto::{Category, Command, Error, Result, WorkflowEvent};
use serde::Serialize;
use tracing::{debug, info};

/// Text sent when the human approves without writing a note.
pub const DEFAULT_APPROVAL: &str = "Approved. Proceed with the analysis plan.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Closed,
    AwaitingResponse,
}

/// The human's answer to a feedback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackDecision {
    Approve { note: Option<String> },
    Modify { feedback: String },
}

impl FeedbackDecision {
    /// Builds the outbound command, rejecting empty modification text.
    pub fn to_command(&self) -> Result<Command> {
        match self {
            Self::Approve { note } => {
                let feedback = note
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_APPROVAL);
                Ok(Command::Feedback {
                    feedback: feedback.to_string(),
                    approve: Some(true),
                })
            }
            Self::Modify { feedback } => {
                let feedback = feedback.trim();
                if feedback.is_empty() {
                    return Err(Error::EmptyFeedback);
                }
                Ok(Command::Feedback {
                    feedback: feedback.to_string(),
                    approve: Some(false),
                })
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Modify { .. } => "modify",
        }
    }
}

/// `closed --feedback_requested--> awaiting_response --{approve|modify}--> closed`
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedbackGate {
    state: GateState,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    categories: Vec<Category>,
}

impl FeedbackGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::FeedbackRequested {
                message,
                categories,
            } => {
                if self.is_open() {
                    debug!("feedback request replaces the outstanding prompt");
                }
                self.state = GateState::AwaitingResponse;
                self.prompt = Some(message.clone());
                self.categories.clone_from(categories);
            }
            event if event.is_terminal() && self.is_open() => {
                debug!(kind = event.kind(), "terminal event closes the feedback gate");
                self.close();
            }
            _ => {}
        }
    }

    /// Validates a decision and returns the command it sends, without
    /// changing the gate.
    pub fn authorize(&self, decision: &FeedbackDecision) -> Result<Command> {
        let command = decision.to_command()?;
        if !self.is_open() {
            debug!(decision = decision.label(), "feedback sent while no request is outstanding");
        }
        Ok(command)
    }

    /// Closes the gate optimistically; backend acceptance is not awaited.
    pub fn resolve(&mut self, decision: &FeedbackDecision) -> Result<Command> {
        let command = self.authorize(decision)?;
        if self.is_open() {
            info!(decision = decision.label(), "feedback gate resolved");
            self.close();
        }
        Ok(command)
    }

    /// Drops any outstanding request without answering it.
    pub fn close(&mut self) {
        self.state = GateState::Closed;
        self.prompt = None;
        self.categories.clear();
    }

    /// Reopens from a stored analysis that was waiting for feedback.
    pub fn seed(&mut self, prompt: Option<&str>, categories: &[Category]) {
        self.state = GateState::AwaitingResponse;
        self.prompt = prompt.map(ToString::to_string);
        self.categories = categories.to_vec();
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == GateState::AwaitingResponse
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }
}
