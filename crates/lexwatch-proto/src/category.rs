use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// Progress row for one category, keyed by `category_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProgress {
    pub category_name: String,
    pub status: CategoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub search_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CategoryProgress {
    /// Creates a pending row for a category.
    pub fn pending(category_name: impl Into<String>) -> Self {
        Self {
            category_name: category_name.into(),
            status: CategoryStatus::Pending,
            content: None,
            search_iterations: 0,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CategoryStatus::Completed
    }
}
