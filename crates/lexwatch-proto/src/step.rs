use serde::{Deserialize, Serialize};

/// Status of a top-level step in the reconstructed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Error,
}

/// The kind of event a substep was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStepKind {
    Plan,
    Feedback,
    Category,
    Progress,
    Research,
    Deposition,
    Completion,
    Error,
}

/// A leaf entry under a step. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SubStepKind,
    pub text: String,
}

/// One phase of the workflow: a title plus the substeps observed during it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub status: StepStatus,
    pub substeps: Vec<SubStep>,
}

impl Step {
    /// Creates a running step with no substeps.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: StepStatus::Running,
            substeps: Vec::new(),
        }
    }

    /// Returns true if a substep with this identity already exists.
    pub fn has_substep(&self, kind: SubStepKind, text: &str) -> bool {
        self.substeps
            .iter()
            .any(|s| s.kind == kind && s.text == text)
    }

    pub fn is_running(&self) -> bool {
        self.status == StepStatus::Running
    }
}
