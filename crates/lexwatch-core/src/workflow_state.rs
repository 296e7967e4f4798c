//! Composition of the per-subsystem reducers into one workflow projection.

use crate::category_tracker::CategoryTracker;
use crate::config::{ConfigError, ConsoleConfig};
use crate::feedback_gate::{FeedbackDecision, FeedbackGate, GateState};
use crate::lifecycle::{Connectivity, LifecycleAction, LifecycleController};
use crate::segmenter::{PhaseSegmenter, SegmentOutcome, SegmentationRules};
use crate::transcript::TranscriptBuilder;
use chrono::{DateTime, Utc};
use lexwatch_proto::{
    CaseRecord, Category, CategoryProgress, ChatMessage, Command, DepositionQuestions, Result,
    Step, StepStatus, WorkflowEvent, WorkflowStatus,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Read-only projection handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub status: WorkflowStatus,
    pub progress_percentage: f64,
    pub categories_completed: usize,
    pub total_categories: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub steps: Vec<Step>,
    pub categories: Vec<CategoryProgress>,
    pub gate: GateSnapshot,
    pub transcript: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposition_questions: Option<DepositionQuestions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_analysis: Option<String>,
    pub connectivity: Connectivity,
    /// Connection lost before the run ended; the shown state may be stale.
    pub indeterminate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    pub state: GateState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub categories: Vec<Category>,
}

/// Full reconstructed state of one analysis run.
///
/// Events are applied one at a time in arrival order. Each subsystem is a
/// reducer over the same event; this type only decides which reducers see
/// an event and in which order.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    segmenter: PhaseSegmenter,
    categories: CategoryTracker,
    gate: FeedbackGate,
    lifecycle: LifecycleController,
    transcript: TranscriptBuilder,
    deposition_questions: Option<DepositionQuestions>,
    final_analysis: Option<String>,
    /// Set once any live event has been applied; seeding is refused after.
    live: bool,
    events_applied: usize,
}

impl WorkflowState {
    pub fn new(config: &ConsoleConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            segmenter: PhaseSegmenter::new(SegmentationRules::from_config(&config.segmentation)?),
            transcript: TranscriptBuilder::new(&config.transcript),
            ..Self::default()
        })
    }

    /// Applies one decoded event. Returns false if the event was ignored.
    pub fn apply(&mut self, event: &WorkflowEvent, at: DateTime<Utc>) -> bool {
        if let WorkflowEvent::Unknown { raw } = event {
            debug!(kind = event.kind(), %raw, "ignoring unrecognised event");
            return false;
        }
        if self.lifecycle.is_terminal() {
            debug!(kind = event.kind(), "run already ended, ignoring event");
            return false;
        }
        self.live = true;
        self.events_applied += 1;

        let outcome = self.segmenter.apply(event, self.gate.is_open());
        if outcome == SegmentOutcome::Duplicate {
            debug!(kind = event.kind(), "redelivered event, skipping projections");
        } else {
            self.categories.apply(event, at);
            self.transcript.apply(event, at);
        }
        self.gate.apply(event);

        match event {
            WorkflowEvent::DepositionGenerated {
                questions: Some(questions),
            } => self.deposition_questions = Some(questions.clone()),
            WorkflowEvent::AnalysisCompleted {
                final_analysis,
                deposition_questions,
                ..
            } => {
                self.final_analysis = Some(final_analysis.clone());
                if let Some(questions) = deposition_questions {
                    self.deposition_questions = Some(questions.clone());
                }
            }
            _ => {}
        }

        self.lifecycle.observe(event);
        true
    }

    /// Restores state from the REST collaborator before the stream catches up.
    ///
    /// Returns false when live events have already been applied.
    pub fn seed(&mut self, case: &CaseRecord) -> bool {
        if self.live {
            debug!(case_id = %case.id, "live events already applied, skipping seed");
            return false;
        }
        let Some(analysis) = case.latest_analysis() else {
            debug!(case_id = %case.id, "case has no analysis yet");
            return false;
        };

        let status = WorkflowStatus::from_backend(&analysis.status).unwrap_or_else(|| {
            warn!(status = %analysis.status, "unrecognised analysis status, treating as pending");
            WorkflowStatus::Pending
        });
        info!(case_id = %case.id, analysis_id = %analysis.id, %status, "seeding from stored analysis");

        self.categories.seed(analysis);
        if analysis.feedback_requested && !status.is_terminal() {
            self.gate
                .seed(analysis.feedback_message.as_deref(), &analysis.categories);
        }
        if let Some(title) = analysis.current_step.as_deref() {
            let step_status = match status {
                WorkflowStatus::Error => StepStatus::Error,
                s if s.is_terminal() => StepStatus::Completed,
                _ => StepStatus::Running,
            };
            self.segmenter.seed(title, step_status);
        }
        self.final_analysis.clone_from(&analysis.final_analysis);
        self.lifecycle.seed(status);
        true
    }

    /// Checks a pause/resume/stop against the current status.
    pub fn authorize(&self, action: LifecycleAction) -> Result<Command> {
        self.lifecycle.authorize(action, self.gate.is_open())
    }

    /// Records an authorized pause/resume/stop.
    pub fn commit(&mut self, action: LifecycleAction, at: DateTime<Utc>) {
        self.lifecycle.commit(action);
        let note = match action {
            LifecycleAction::Pause => "Analysis paused.",
            LifecycleAction::Resume => "Analysis resumed.",
            LifecycleAction::Stop => {
                self.segmenter.halt();
                self.gate.close();
                "Analysis stopped."
            }
        };
        self.transcript.system_note(note, at);
    }

    pub fn authorize_feedback(&self, decision: &FeedbackDecision) -> Result<Command> {
        self.gate.authorize(decision)
    }

    /// Records the human's feedback and resolves the gate.
    pub fn commit_feedback(
        &mut self,
        decision: &FeedbackDecision,
        at: DateTime<Utc>,
    ) -> Result<Command> {
        let command = self.authorize_feedback(decision)?;
        self.record_feedback(&command, at)?;
        self.resolve_feedback(decision)
    }

    /// Appends the user's text to the transcript. The gate is left as is.
    pub fn record_feedback(&mut self, command: &Command, at: DateTime<Utc>) -> Result<()> {
        if let Command::Feedback { feedback, .. } = command {
            self.transcript.user_message(feedback, at)?;
        }
        Ok(())
    }

    /// Closes an open gate once the feedback is cleared to send.
    pub fn resolve_feedback(&mut self, decision: &FeedbackDecision) -> Result<Command> {
        self.gate.resolve(decision)
    }

    /// Called once the backend accepted a start request.
    pub fn start_requested(&mut self, at: DateTime<Utc>) {
        self.lifecycle.mark_started();
        self.transcript.system_note("Analysis started.", at);
    }

    pub fn connection_established(&mut self, at: DateTime<Utc>) {
        let was_lost = self.lifecycle.connectivity() == Connectivity::Disconnected;
        self.lifecycle.set_connected();
        if was_lost {
            self.transcript.system_note("Reconnected.", at);
        }
    }

    pub fn connection_lost(&mut self, reason: &str, at: DateTime<Utc>) {
        if self.lifecycle.connectivity() == Connectivity::Disconnected {
            return;
        }
        self.lifecycle.set_disconnected(reason);
        self.transcript.system_note(
            format!("Connection lost ({reason}). Showing last known state."),
            at,
        );
    }

    pub fn status(&self) -> WorkflowStatus {
        self.lifecycle.status(self.gate.is_open())
    }

    pub fn is_terminal(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    pub fn steps(&self) -> &[Step] {
        self.segmenter.steps()
    }

    pub fn categories(&self) -> &CategoryTracker {
        &self.categories
    }

    pub fn gate(&self) -> &FeedbackGate {
        &self.gate
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    pub fn events_applied(&self) -> usize {
        self.events_applied
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            status: self.status(),
            progress_percentage: self.categories.progress_percentage(),
            categories_completed: self.categories.completed_count(),
            total_categories: self.categories.total(),
            current_step: self.segmenter.current_title().map(ToString::to_string),
            steps: self.segmenter.steps().to_vec(),
            categories: self.categories.rows(),
            gate: GateSnapshot {
                state: self.gate.state(),
                prompt: self.gate.prompt().map(ToString::to_string),
                categories: self.gate.categories().to_vec(),
            },
            transcript: self.transcript.messages().to_vec(),
            deposition_questions: self.deposition_questions.clone(),
            final_analysis: self.final_analysis.clone(),
            connectivity: self.lifecycle.connectivity(),
            indeterminate: self.lifecycle.is_indeterminate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexwatch_proto::{CategoryStatus, Error, ProgressSnapshot, Role};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn progress(message: Option<&str>) -> WorkflowEvent {
        WorkflowEvent::ProgressUpdate {
            message: message.map(ToString::to_string),
            snapshot: ProgressSnapshot::default(),
        }
    }

    fn research(message: &str) -> WorkflowEvent {
        WorkflowEvent::ResearchProgress {
            message: message.into(),
        }
    }

    fn names(names: &[&str]) -> Vec<Category> {
        names.iter().map(|n| Category::named(*n)).collect()
    }

    #[test]
    fn test_plan_category_completion_scenario() {
        let mut state = WorkflowState::default();
        state.apply(
            &WorkflowEvent::PlanGenerated {
                total_categories: 3,
                categories: names(&["Liability", "Damages", "Witnesses"]),
            },
            now(),
        );
        assert_eq!(state.categories().rows().len(), 3);

        state.apply(
            &WorkflowEvent::CategoryCompleted {
                categories: names(&["Damages"]),
            },
            now(),
        );
        let rows = state.categories().rows();
        assert_eq!(rows[1].status, CategoryStatus::Completed);
        assert_eq!(rows[0].status, CategoryStatus::Pending);
        assert_eq!(rows[2].status, CategoryStatus::Pending);

        let completed = WorkflowEvent::AnalysisCompleted {
            final_analysis: "Final memo: settle.".into(),
            completed_categories: names(&["Liability", "Damages", "Witnesses"]),
            deposition_questions: None,
        };
        state.apply(&completed, now());
        state.apply(&completed, now());

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, WorkflowStatus::Completed);
        assert!((snapshot.progress_percentage - 100.0).abs() < f64::EPSILON);
        let finals = snapshot
            .transcript
            .iter()
            .filter(|m| m.role == Role::Assistant && m.content.contains("Final memo"))
            .count();
        assert_eq!(finals, 1);
        assert_eq!(snapshot.final_analysis.as_deref(), Some("Final memo: settle."));
    }

    #[test]
    fn test_gate_freezes_status_and_steps() {
        let mut state = WorkflowState::default();
        state.apply(&research("Round 1: reviewing contracts"), now());
        state.apply(
            &WorkflowEvent::FeedbackRequested {
                message: "Approve the plan?".into(),
                categories: Vec::new(),
            },
            now(),
        );
        state.apply(&progress(Some("Compiling results")), now());
        state.apply(&research("Round 2: more searching"), now());

        assert_eq!(state.status(), WorkflowStatus::AwaitingFeedback);
        assert_eq!(state.steps().len(), 1);
        assert_eq!(state.steps()[0].status, StepStatus::Running);

        state
            .commit_feedback(&FeedbackDecision::Approve { note: None }, now())
            .unwrap();
        assert_eq!(state.status(), WorkflowStatus::InProgress);

        state.apply(&research("Round 2: more searching"), now());
        assert_eq!(state.steps().len(), 2);
        assert_eq!(state.steps()[0].status, StepStatus::Completed);
    }

    #[test]
    fn test_error_is_terminal_and_shown_verbatim() {
        let mut state = WorkflowState::default();
        state.apply(&research("Round 1: start"), now());
        state.apply(
            &WorkflowEvent::Error {
                message: "Document store unreachable".into(),
            },
            now(),
        );
        assert!(!state.apply(&research("Round 2: start"), now()));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, WorkflowStatus::Error);
        let last = snapshot.transcript.last().unwrap();
        assert_eq!(last.role, Role::System);
        assert_eq!(last.content, "Document store unreachable");
        assert_eq!(snapshot.steps.len(), 1);
    }

    #[test]
    fn test_duplicate_research_does_not_double_count() {
        let mut state = WorkflowState::default();
        state.apply(
            &WorkflowEvent::PlanGenerated {
                total_categories: 1,
                categories: names(&["Damages"]),
            },
            now(),
        );
        let event = research("Searching records about damages");
        state.apply(&event, now());
        state.apply(&event, now());

        assert_eq!(
            state.categories().get("Damages").unwrap().search_iterations,
            1
        );
        assert_eq!(state.steps()[0].substeps.len(), 1);
    }

    #[test]
    fn test_unknown_events_change_nothing() {
        let mut state = WorkflowState::default();
        let changed = state.apply(
            &WorkflowEvent::Unknown {
                raw: serde_json::json!({"type": "node_update"}),
            },
            now(),
        );
        assert!(!changed);
        assert_eq!(state.status(), WorkflowStatus::Draft);
        assert!(state.transcript().is_empty());
    }

    #[test]
    fn test_lifecycle_commands_add_notes() {
        let mut state = WorkflowState::default();
        assert!(matches!(
            state.authorize(LifecycleAction::Pause),
            Err(Error::InvalidTransition { .. })
        ));

        state.apply(&research("Round 1: start"), now());
        assert_eq!(state.authorize(LifecycleAction::Pause).unwrap(), Command::Pause);
        state.commit(LifecycleAction::Pause, now());
        assert_eq!(state.status(), WorkflowStatus::Paused);

        state.commit(LifecycleAction::Stop, now());
        assert_eq!(state.status(), WorkflowStatus::Stopped);
        assert_eq!(state.steps()[0].status, StepStatus::Running);
        assert_eq!(state.transcript().last().unwrap().content, "Analysis stopped.");
        assert!(!state.apply(&research("Round 2: start"), now()));
    }

    #[test]
    fn test_seed_then_live_events() {
        let case: CaseRecord = serde_json::from_value(serde_json::json!({
            "id": "case-7",
            "title": "Doe v. Widget Co",
            "status": "analyzing",
            "analyses": [{
                "id": "a-1",
                "status": "in_progress",
                "current_step": "Research round 1",
                "categories": [{"name": "Liability"}, {"name": "Damages"}],
                "category_progress": [
                    {"category_name": "Liability", "status": "completed"}
                ]
            }]
        }))
        .unwrap();

        let mut state = WorkflowState::default();
        assert!(state.seed(&case));
        assert_eq!(state.status(), WorkflowStatus::InProgress);
        assert!((state.snapshot().progress_percentage - 50.0).abs() < f64::EPSILON);

        state.apply(&research("Round 1: still searching"), now());
        assert_eq!(state.steps().len(), 1);
        state.apply(&research("Round 2: new leads"), now());
        assert_eq!(state.steps().len(), 2);

        assert!(!state.seed(&case));
    }

    #[test]
    fn test_disconnect_marks_indeterminate() {
        let mut state = WorkflowState::default();
        state.connection_established(now());
        state.apply(&research("Round 1: start"), now());
        state.connection_lost("socket reset", now());
        state.connection_lost("socket reset", now());

        let snapshot = state.snapshot();
        assert!(snapshot.indeterminate);
        assert_eq!(snapshot.connectivity, Connectivity::Disconnected);
        let notes = snapshot
            .transcript
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(notes, 1);

        state.connection_established(now());
        assert!(!state.snapshot().indeterminate);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut state = WorkflowState::default();
        state.apply(&progress(Some("Preparing")), now());
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["gate"]["state"], "closed");
        assert_eq!(json["current_step"], "Preparing");
    }
}
