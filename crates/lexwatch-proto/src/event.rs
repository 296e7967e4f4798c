//! Typed workflow events decoded from the agent's stream.

use serde::{Deserialize, Serialize};

/// One unit of legal analysis the backend plans to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_document_search: bool,
    /// Drafted content, present once the category has been analysed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Category {
    /// Creates a category descriptor with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            requires_document_search: false,
            content: None,
        }
    }

    /// Sets the drafted content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Deposition questions as delivered by the backend: free text or a
/// structured document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepositionQuestions {
    Text(String),
    Structured(serde_json::Value),
}

/// Advisory counters some backends attach to `progress_update` frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories_completed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_categories: Option<usize>,
}

/// A single event emitted by the analysis agent.
///
/// Exactly one variant per frame. Unrecognised `type` tags are kept as
/// `Unknown` so they can be logged without ever being rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    PlanGenerated {
        total_categories: usize,
        categories: Vec<Category>,
    },
    FeedbackRequested {
        message: String,
        categories: Vec<Category>,
    },
    CategoryCompleted {
        categories: Vec<Category>,
    },
    ProgressUpdate {
        message: Option<String>,
        snapshot: ProgressSnapshot,
    },
    /// Research activity; the message may carry a round marker ("Round 2").
    ResearchProgress {
        message: String,
    },
    DepositionGenerated {
        questions: Option<DepositionQuestions>,
    },
    AnalysisCompleted {
        final_analysis: String,
        completed_categories: Vec<Category>,
        deposition_questions: Option<DepositionQuestions>,
    },
    Error {
        message: String,
    },
    Unknown {
        raw: serde_json::Value,
    },
}

impl WorkflowEvent {
    /// Returns the wire tag for this event.
    pub fn kind(&self) -> &str {
        match self {
            Self::PlanGenerated { .. } => "plan_generated",
            Self::FeedbackRequested { .. } => "feedback_requested",
            Self::CategoryCompleted { .. } => "category_completed",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::ResearchProgress { .. } => "research_progress",
            Self::DepositionGenerated { .. } => "deposition_generated",
            Self::AnalysisCompleted { .. } => "analysis_completed",
            Self::Error { .. } => "error",
            Self::Unknown { raw } => raw
                .get("type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    /// Returns the human-readable message carried by the event, if any.
    pub fn message(&self) -> Option<&str> {
        let message = match self {
            Self::FeedbackRequested { message, .. }
            | Self::ResearchProgress { message }
            | Self::Error { message } => Some(message.as_str()),
            Self::ProgressUpdate { message, .. } => message.as_deref(),
            _ => None,
        };
        message.filter(|m| !m.trim().is_empty())
    }

    /// Returns true for events that end the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AnalysisCompleted { .. } | Self::Error { .. })
    }

    /// Returns true for every recognised event.
    pub fn is_substantive(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }
}
