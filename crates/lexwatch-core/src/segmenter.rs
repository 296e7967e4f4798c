//! Phase segmentation.
//!
//! Folds the flat event stream into a tree of steps and substeps. A new step
//! starts only on a genuine phase change (first event, a new research round,
//! the final synthesis); everything else is appended under the current step.
//! Phase changes are detected by comparing the would-be title against the
//! current title, so a burst of same-phase events collapses into one step.
//! Events for a phase that already has an earlier step are redeliveries and
//! are dropped.

use crate::config::{ConfigError, DEFAULT_ROUND_PATTERN, SegmentationConfig};
use lexwatch_proto::{Category, Step, StepStatus, SubStep, SubStepKind, WorkflowEvent};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, trace};

static DEFAULT_ROUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_ROUND_PATTERN).expect("valid round marker regex"));

/// Compiled segmentation heuristics.
#[derive(Debug, Clone)]
pub struct SegmentationRules {
    round: Regex,
    compiling_marker: String,
    research_title: String,
    final_title: String,
    initial_title: String,
}

impl SegmentationRules {
    pub fn from_config(config: &SegmentationConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            round: config.round_regex()?,
            compiling_marker: config.compiling_marker.to_lowercase(),
            research_title: config.research_title.clone(),
            final_title: config.final_title.clone(),
            initial_title: config.initial_title.clone(),
        })
    }

    /// Returns the research-step title for a message carrying a round marker.
    pub fn round_title(&self, message: &str) -> Option<String> {
        let captures = self.round.captures(message)?;
        let round = captures
            .get(1)
            .map_or_else(|| captures[0].trim(), |m| m.as_str());
        Some(self.research_title.replace("{round}", round))
    }

    /// Returns true if the message announces the final synthesis phase.
    pub fn is_compiling(&self, message: &str) -> bool {
        message.to_lowercase().contains(&self.compiling_marker)
    }

    pub fn final_title(&self) -> &str {
        &self.final_title
    }
}

impl Default for SegmentationRules {
    fn default() -> Self {
        let config = SegmentationConfig::default();
        Self {
            round: DEFAULT_ROUND_RE.clone(),
            compiling_marker: config.compiling_marker.to_lowercase(),
            research_title: config.research_title,
            final_title: config.final_title,
            initial_title: config.initial_title,
        }
    }
}

/// What the segmenter did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// The event opened a new step and was consumed by it.
    StepStarted { step_id: String },
    /// The event was appended as a substep of the current step.
    Appended { substep_id: String },
    /// An identical substep already exists under the current step.
    Duplicate,
    /// The event carries nothing to show (e.g. a bare progress tick).
    Skipped,
    /// The event ended the run.
    Terminated,
    /// Unknown event, or the run had already ended.
    Ignored,
}

/// Reducer owning the step tree for one run.
#[derive(Debug, Clone, Default)]
pub struct PhaseSegmenter {
    rules: SegmentationRules,
    steps: Vec<Step>,
    terminal: bool,
}

impl PhaseSegmenter {
    pub fn new(rules: SegmentationRules) -> Self {
        Self {
            rules,
            steps: Vec::new(),
            terminal: false,
        }
    }

    /// Applies one event.
    ///
    /// `gated` is true while a feedback request is outstanding; phase
    /// transitions are then suppressed so the current step is not marked
    /// completed before the human has answered.
    pub fn apply(&mut self, event: &WorkflowEvent, gated: bool) -> SegmentOutcome {
        if self.terminal {
            trace!(kind = event.kind(), "segmenter terminal, ignoring event");
            return SegmentOutcome::Ignored;
        }

        match event {
            WorkflowEvent::Unknown { .. } => SegmentOutcome::Ignored,
            WorkflowEvent::Error { message } => {
                if self.steps.is_empty() {
                    self.start_step(message.clone(), true);
                } else {
                    self.append(SubStepKind::Error, message.clone());
                }
                if let Some(step) = self.steps.last_mut() {
                    step.status = StepStatus::Error;
                }
                self.terminal = true;
                SegmentOutcome::Terminated
            }
            WorkflowEvent::AnalysisCompleted { .. } => {
                if self.steps.is_empty() {
                    self.start_step(self.rules.final_title.clone(), false);
                }
                if let Some(step) = self.steps.last_mut() {
                    step.status = StepStatus::Completed;
                }
                self.terminal = true;
                SegmentOutcome::Terminated
            }
            _ => {
                if let Some(title) = self.phase_title(event)
                    && self.is_earlier_step(&title)
                {
                    debug!(title = %title, "event belongs to an earlier step, skipped");
                    return SegmentOutcome::Duplicate;
                }
                if let Some(title) = self.transition_title(event, gated) {
                    let step_id = self.start_step(title, false);
                    return SegmentOutcome::StepStarted { step_id };
                }
                match substep_for(event) {
                    Some((kind, text)) => self.append(kind, text),
                    None => SegmentOutcome::Skipped,
                }
            }
        }
    }

    /// Returns the title of the step this event should open, if any.
    fn transition_title(&self, event: &WorkflowEvent, gated: bool) -> Option<String> {
        let Some(current) = self.steps.last() else {
            return Some(self.opening_title(event));
        };
        if gated {
            return None;
        }
        self.phase_title(event).filter(|title| *title != current.title)
    }

    /// Title of the phase an event announces: a research round or the final
    /// synthesis.
    fn phase_title(&self, event: &WorkflowEvent) -> Option<String> {
        let message = match event {
            WorkflowEvent::ResearchProgress { message } => message.as_str(),
            WorkflowEvent::ProgressUpdate {
                message: Some(message),
                ..
            } => message.as_str(),
            _ => return None,
        };
        if self.rules.is_compiling(message) {
            return Some(self.rules.final_title.clone());
        }
        if matches!(event, WorkflowEvent::ResearchProgress { .. }) {
            return self.rules.round_title(message);
        }
        None
    }

    /// True if a step other than the current one already has this title.
    fn is_earlier_step(&self, title: &str) -> bool {
        match self.steps.split_last() {
            Some((current, earlier)) => {
                current.title != title && earlier.iter().any(|s| s.title == title)
            }
            None => false,
        }
    }

    fn opening_title(&self, event: &WorkflowEvent) -> String {
        if let Some(message) = event.message() {
            if self.rules.is_compiling(message) {
                return self.rules.final_title.clone();
            }
            if matches!(event, WorkflowEvent::ResearchProgress { .. })
                && let Some(title) = self.rules.round_title(message)
            {
                return title;
            }
        }
        substep_for(event).map_or_else(|| self.rules.initial_title.clone(), |(_, text)| text)
    }

    /// Opens a new step, closing the previous one.
    fn start_step(&mut self, title: String, trigger_is_error: bool) -> String {
        if let Some(previous) = self.steps.last_mut()
            && previous.is_running()
        {
            previous.status = if trigger_is_error {
                StepStatus::Error
            } else {
                StepStatus::Completed
            };
        }
        let id = format!("step-{}", self.steps.len() + 1);
        debug!(step_id = %id, title = %title, "starting step");
        self.steps.push(Step::new(id.clone(), title));
        id
    }

    fn append(&mut self, kind: SubStepKind, text: String) -> SegmentOutcome {
        let Some(step) = self.steps.last_mut() else {
            return SegmentOutcome::Skipped;
        };
        if step.has_substep(kind, &text) {
            debug!(step_id = %step.id, ?kind, "duplicate substep skipped");
            return SegmentOutcome::Duplicate;
        }
        let substep_id = format!("{}.{}", step.id, step.substeps.len() + 1);
        step.substeps.push(SubStep {
            id: substep_id.clone(),
            kind,
            text,
        });
        SegmentOutcome::Appended { substep_id }
    }

    /// Seeds the tree with the step reported by the REST API.
    ///
    /// Only applies to an empty tree.
    pub fn seed(&mut self, title: &str, status: StepStatus) {
        if !self.steps.is_empty() || title.trim().is_empty() {
            return;
        }
        self.start_step(title.to_string(), false);
        if let Some(step) = self.steps.last_mut() {
            step.status = status;
        }
        if status != StepStatus::Running {
            self.terminal = true;
        }
    }

    /// Freezes the tree without changing any step status.
    pub fn halt(&mut self) {
        self.terminal = true;
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Title of the last step with a non-empty title.
    pub fn current_title(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .map(|s| s.title.as_str())
            .find(|t| !t.trim().is_empty())
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}

/// Maps an event to the substep it renders as.
fn substep_for(event: &WorkflowEvent) -> Option<(SubStepKind, String)> {
    let entry = match event {
        WorkflowEvent::PlanGenerated {
            total_categories, ..
        } => (
            SubStepKind::Plan,
            format!("Analysis plan generated with {total_categories} categories"),
        ),
        WorkflowEvent::FeedbackRequested { message, .. } => {
            (SubStepKind::Feedback, message.clone())
        }
        WorkflowEvent::CategoryCompleted { categories } => {
            if categories.is_empty() {
                return None;
            }
            (
                SubStepKind::Category,
                format!("Completed: {}", category_names(categories)),
            )
        }
        WorkflowEvent::ProgressUpdate { .. } => {
            (SubStepKind::Progress, event.message()?.to_string())
        }
        WorkflowEvent::ResearchProgress { .. } => {
            (SubStepKind::Research, event.message()?.to_string())
        }
        WorkflowEvent::DepositionGenerated { .. } => (
            SubStepKind::Deposition,
            "Deposition questions generated".to_string(),
        ),
        WorkflowEvent::AnalysisCompleted { .. } => (
            SubStepKind::Completion,
            "Final analysis compiled".to_string(),
        ),
        WorkflowEvent::Error { message } => (SubStepKind::Error, message.clone()),
        WorkflowEvent::Unknown { .. } => return None,
    };
    Some(entry)
}

pub(crate) fn category_names(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
