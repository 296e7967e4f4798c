use crate::text::truncate_with_ellipsis;
use crate::workflow_state::WorkflowSnapshot;
use lexwatch_proto::{CategoryStatus, StepStatus, WorkflowStatus};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const STATUS_JSON: &str = ".lexwatch-status.json";
pub const STATUS_MARKDOWN: &str = ".lexwatch-status.md";

/// Machine-readable status structure.
#[derive(Debug, Serialize)]
pub struct CaseStatus<'a> {
    pub case_id: &'a str,
    pub updated_at: String,
    #[serde(flatten)]
    pub snapshot: &'a WorkflowSnapshot,
}

/// Writes the current case view to disk for other tools to pick up.
#[derive(Debug, Clone)]
pub struct StatusManager {
    dir: PathBuf,
}

impl StatusManager {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn json_path(&self) -> PathBuf {
        self.dir.join(STATUS_JSON)
    }

    pub fn markdown_path(&self) -> PathBuf {
        self.dir.join(STATUS_MARKDOWN)
    }

    /// Rewrites both artifacts from a snapshot.
    pub fn update(&self, case_id: &str, snapshot: &WorkflowSnapshot) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let status = CaseStatus {
            case_id,
            updated_at: chrono::Utc::now().to_rfc3339(),
            snapshot,
        };
        let json = serde_json::to_string_pretty(&status).map_err(io::Error::other)?;
        fs::write(self.json_path(), json)?;
        fs::write(self.markdown_path(), format_markdown(case_id, snapshot))?;
        debug!(dir = %self.dir.display(), "status artifacts updated");
        Ok(())
    }
}

fn format_markdown(case_id: &str, snapshot: &WorkflowSnapshot) -> String {
    let mut md = format!(
        "# Case {case_id}\n\n\
         - **Status:** {}\n\
         - **Current step:** {}\n\
         - **Progress:** {:.2}% ({} / {} categories)\n",
        status_label(snapshot.status),
        snapshot.current_step.as_deref().unwrap_or("-"),
        snapshot.progress_percentage,
        snapshot.categories_completed,
        snapshot.total_categories,
    );
    if snapshot.indeterminate {
        md.push_str("- **Connection:** lost, state may be stale\n");
    }

    if let Some(prompt) = snapshot.gate.prompt.as_deref() {
        md.push_str("\n## Awaiting feedback\n\n");
        md.push_str(&format!("> {}\n", prompt.replace('\n', "\n> ")));
    }

    if !snapshot.steps.is_empty() {
        md.push_str("\n## Steps\n\n");
        for step in &snapshot.steps {
            let mark = match step.status {
                StepStatus::Running => "[~]",
                StepStatus::Completed => "[x]",
                StepStatus::Error => "[!]",
            };
            md.push_str(&format!("- {mark} {}\n", step.title));
            for substep in &step.substeps {
                md.push_str(&format!("  - {}\n", truncate_with_ellipsis(&substep.text, 120)));
            }
        }
    }

    if !snapshot.categories.is_empty() {
        md.push_str("\n## Categories\n\n| Category | Status | Searches |\n| --- | --- | --- |\n");
        for row in &snapshot.categories {
            let status = match row.status {
                CategoryStatus::Pending => "pending",
                CategoryStatus::InProgress => "in progress",
                CategoryStatus::Completed => "completed",
            };
            md.push_str(&format!(
                "| {} | {status} | {} |\n",
                row.category_name, row.search_iterations
            ));
        }
    }
    md
}

fn status_label(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Draft => "Draft",
        WorkflowStatus::Pending => "Pending",
        WorkflowStatus::InProgress => "In progress",
        WorkflowStatus::AwaitingFeedback => "Awaiting feedback",
        WorkflowStatus::Paused => "Paused",
        WorkflowStatus::Completed => "Completed",
        WorkflowStatus::Error => "Error",
        WorkflowStatus::Stopped => "Stopped",
    }
}
