//! Records returned by the case/analysis REST API.

use crate::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A case with its analyses, as returned by `GET /api/v1/cases/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub analyses: Vec<AnalysisRecord>,
}

impl CaseRecord {
    /// Returns the most recently created analysis.
    ///
    /// Falls back to list order when creation times are missing.
    pub fn latest_analysis(&self) -> Option<&AnalysisRecord> {
        if self.analyses.iter().all(|a| a.created_at.is_some()) {
            self.analyses.iter().max_by_key(|a| a.created_at)
        } else {
            self.analyses.last()
        }
    }
}

/// Persisted state of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub category_progress: Vec<CategoryProgressRecord>,
    #[serde(default)]
    pub total_categories: Option<usize>,
    #[serde(default)]
    pub feedback_requested: bool,
    #[serde(default)]
    pub feedback_message: Option<String>,
    #[serde(default)]
    pub final_analysis: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Persisted category progress. The status is kept as the raw string
/// because the API also knows statuses the console does not model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProgressRecord {
    pub category_name: String,
    pub status: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub search_iterations: u32,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Response of `POST /api/v1/analysis/{case_id}/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedAnalysis {
    pub analysis_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
