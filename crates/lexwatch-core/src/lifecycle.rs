//! Workflow lifecycle controller.
//!
//! Status is derived, never stored directly: a terminal event wins, then a
//! local pause, then an open feedback gate, then "in progress" once anything
//! substantive has been seen.

use lexwatch_proto::{Command, Error, Result, WorkflowEvent, WorkflowStatus};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Local control actions the human can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Pause,
    Resume,
    Stop,
}

impl LifecycleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
        }
    }

    pub fn command(self) -> Command {
        match self {
            Self::Pause => Command::Pause,
            Self::Resume => Command::Resume,
            Self::Stop => Command::Stop,
        }
    }
}

/// State of the case connection as seen by the human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Offline,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleController {
    base: WorkflowStatus,
    started: bool,
    paused: bool,
    terminal: Option<WorkflowStatus>,
    connectivity: Connectivity,
    disconnect_reason: Option<String>,
}

impl LifecycleController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one inbound event.
    pub fn observe(&mut self, event: &WorkflowEvent) {
        if let Some(terminal) = self.terminal {
            debug!(kind = event.kind(), %terminal, "status is terminal, event has no effect");
            return;
        }
        match event {
            WorkflowEvent::AnalysisCompleted { .. } => {
                info!("analysis completed");
                self.terminal = Some(WorkflowStatus::Completed);
            }
            WorkflowEvent::Error { message } => {
                warn!(%message, "analysis failed");
                self.terminal = Some(WorkflowStatus::Error);
            }
            event if event.is_substantive() => self.started = true,
            _ => {}
        }
    }

    pub fn status(&self, gate_open: bool) -> WorkflowStatus {
        if let Some(terminal) = self.terminal {
            terminal
        } else if self.paused {
            WorkflowStatus::Paused
        } else if self.started && gate_open {
            WorkflowStatus::AwaitingFeedback
        } else if self.started {
            WorkflowStatus::InProgress
        } else {
            self.base
        }
    }

    /// Checks that `action` is permitted and returns the command to send.
    pub fn authorize(&self, action: LifecycleAction, gate_open: bool) -> Result<Command> {
        let status = self.status(gate_open);
        let permitted = match action {
            LifecycleAction::Pause => matches!(
                status,
                WorkflowStatus::InProgress | WorkflowStatus::AwaitingFeedback
            ),
            LifecycleAction::Resume => status == WorkflowStatus::Paused,
            LifecycleAction::Stop => !status.is_terminal() && status != WorkflowStatus::Draft,
        };
        if permitted {
            Ok(action.command())
        } else {
            debug!(action = action.as_str(), %status, "lifecycle command rejected");
            Err(Error::InvalidTransition {
                action: action.as_str(),
                status,
            })
        }
    }

    /// Records an authorized action.
    pub fn commit(&mut self, action: LifecycleAction) {
        match action {
            LifecycleAction::Pause => self.paused = true,
            LifecycleAction::Resume => self.paused = false,
            LifecycleAction::Stop => {
                self.paused = false;
                self.terminal = Some(WorkflowStatus::Stopped);
            }
        }
    }

    pub fn pause(&mut self, gate_open: bool) -> Result<Command> {
        self.transition(LifecycleAction::Pause, gate_open)
    }

    pub fn resume(&mut self, gate_open: bool) -> Result<Command> {
        self.transition(LifecycleAction::Resume, gate_open)
    }

    pub fn stop(&mut self, gate_open: bool) -> Result<Command> {
        self.transition(LifecycleAction::Stop, gate_open)
    }

    fn transition(&mut self, action: LifecycleAction, gate_open: bool) -> Result<Command> {
        let command = self.authorize(action, gate_open)?;
        self.commit(action);
        Ok(command)
    }

    /// Called when a start request has been accepted by the backend.
    pub fn mark_started(&mut self) {
        if self.terminal.is_none() && self.base == WorkflowStatus::Draft {
            self.base = WorkflowStatus::Pending;
        }
    }

    /// Restores the status reported by the REST API.
    pub fn seed(&mut self, status: WorkflowStatus) {
        if self.started || self.terminal.is_some() {
            return;
        }
        match status {
            WorkflowStatus::Draft | WorkflowStatus::Pending => self.base = status,
            WorkflowStatus::InProgress | WorkflowStatus::AwaitingFeedback => self.started = true,
            WorkflowStatus::Paused => {
                self.started = true;
                self.paused = true;
            }
            WorkflowStatus::Completed | WorkflowStatus::Error | WorkflowStatus::Stopped => {
                self.terminal = Some(status);
            }
        }
    }

    pub fn set_connected(&mut self) {
        self.connectivity = Connectivity::Connected;
        self.disconnect_reason = None;
    }

    pub fn set_disconnected(&mut self, reason: impl Into<String>) {
        self.connectivity = Connectivity::Disconnected;
        self.disconnect_reason = Some(reason.into());
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnect_reason.as_deref()
    }

    /// True while the connection is lost and the run has not ended.
    pub fn is_indeterminate(&self) -> bool {
        self.connectivity == Connectivity::Disconnected && self.terminal.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn research() -> WorkflowEvent {
        WorkflowEvent::ResearchProgress {
            message: "Round 1".into(),
        }
    }

    #[test]
    fn test_draft_until_first_event() {
        let mut lifecycle = LifecycleController::new();
        assert_eq!(lifecycle.status(false), WorkflowStatus::Draft);

        lifecycle.observe(&WorkflowEvent::Unknown {
            raw: serde_json::json!({"type": "heartbeat"}),
        });
        assert_eq!(lifecycle.status(false), WorkflowStatus::Draft);

        lifecycle.observe(&research());
        assert_eq!(lifecycle.status(false), WorkflowStatus::InProgress);
    }

    #[test]
    fn test_open_gate_reports_awaiting_feedback() {
        let mut lifecycle = LifecycleController::new();
        lifecycle.observe(&research());
        assert_eq!(lifecycle.status(true), WorkflowStatus::AwaitingFeedback);
    }

    #[test]
    fn test_pause_resume_round_trip() {
        let mut lifecycle = LifecycleController::new();
        lifecycle.observe(&research());

        assert_eq!(lifecycle.pause(false).unwrap(), Command::Pause);
        assert_eq!(lifecycle.status(false), WorkflowStatus::Paused);
        assert!(lifecycle.pause(false).is_err());

        assert_eq!(lifecycle.resume(false).unwrap(), Command::Resume);
        assert_eq!(lifecycle.status(false), WorkflowStatus::InProgress);
    }

    #[test]
    fn test_pause_on_completed_is_invalid() {
        let mut lifecycle = LifecycleController::new();
        lifecycle.observe(&WorkflowEvent::AnalysisCompleted {
            final_analysis: "done".into(),
            completed_categories: Vec::new(),
            deposition_questions: None,
        });
        let err = lifecycle.pause(false).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                action: "pause",
                status: WorkflowStatus::Completed
            }
        ));
    }

    #[test]
    fn test_terminal_status_is_monotonic() {
        let mut lifecycle = LifecycleController::new();
        lifecycle.observe(&WorkflowEvent::Error {
            message: "boom".into(),
        });
        lifecycle.observe(&research());
        lifecycle.observe(&WorkflowEvent::AnalysisCompleted {
            final_analysis: "late".into(),
            completed_categories: Vec::new(),
            deposition_questions: None,
        });
        assert_eq!(lifecycle.status(true), WorkflowStatus::Error);
        assert!(lifecycle.stop(false).is_err());
    }

    #[test]
    fn test_stop_is_terminal() {
        let mut lifecycle = LifecycleController::new();
        assert!(lifecycle.stop(false).is_err());

        lifecycle.mark_started();
        assert_eq!(lifecycle.status(false), WorkflowStatus::Pending);
        assert_eq!(lifecycle.stop(false).unwrap(), Command::Stop);
        assert_eq!(lifecycle.status(false), WorkflowStatus::Stopped);
    }

    #[test]
    fn test_disconnect_is_indeterminate_until_terminal() {
        let mut lifecycle = LifecycleController::new();
        lifecycle.set_connected();
        lifecycle.set_disconnected("socket closed");
        assert!(lifecycle.is_indeterminate());
        assert_eq!(lifecycle.disconnect_reason(), Some("socket closed"));

        lifecycle.seed(WorkflowStatus::Completed);
        assert!(!lifecycle.is_indeterminate());
    }

    #[test]
    fn test_seed_ignored_after_live_events() {
        let mut lifecycle = LifecycleController::new();
        lifecycle.observe(&research());
        lifecycle.seed(WorkflowStatus::Paused);
        assert_eq!(lifecycle.status(false), WorkflowStatus::InProgress);
    }
}
