//! Terminal rendering of the workflow projection.

use chrono::Local;
use colored::{ColoredString, Colorize};
use lexwatch_core::{GateState, WorkflowSnapshot, truncate_with_ellipsis};
use lexwatch_proto::{CategoryStatus, ChatMessage, Role, StepStatus, WorkflowStatus};
use std::fmt::Write as _;

/// Prints only what changed since the previous snapshot.
#[derive(Debug, Default)]
pub struct Renderer {
    printed_messages: usize,
    status: Option<WorkflowStatus>,
    step_titles: usize,
    completed: Option<(usize, usize)>,
    gate_open: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, snapshot: &WorkflowSnapshot) {
        print!("{}", self.diff(snapshot));
    }

    /// Renders the changes between the last seen snapshot and this one.
    pub fn diff(&mut self, snapshot: &WorkflowSnapshot) -> String {
        let mut out = String::new();

        for step in snapshot.steps.iter().skip(self.step_titles) {
            let _ = writeln!(out, "{} {}", "==>".bold().blue(), step.title.bold());
        }
        self.step_titles = snapshot.steps.len();

        // A fresh run restarts the transcript.
        if snapshot.transcript.len() < self.printed_messages {
            self.printed_messages = 0;
        }
        for message in snapshot.transcript.iter().skip(self.printed_messages) {
            out.push_str(&format_message(message));
        }
        self.printed_messages = snapshot.transcript.len();

        let counts = (snapshot.categories_completed, snapshot.total_categories);
        if counts.1 > 0 && self.completed != Some(counts) {
            let _ = writeln!(
                out,
                "{} {}/{} categories ({:.2}%)",
                "progress".dimmed(),
                counts.0,
                counts.1,
                snapshot.progress_percentage
            );
        }
        self.completed = Some(counts);

        let gate_open = snapshot.gate.state == GateState::AwaitingResponse;
        if gate_open && !self.gate_open {
            let _ = writeln!(
                out,
                "{} type feedback to revise, or /approve to continue",
                "feedback requested:".yellow().bold()
            );
        }
        self.gate_open = gate_open;

        if self.status != Some(snapshot.status) {
            let _ = writeln!(out, "{} {}", "status".dimmed(), status_label(snapshot.status));
            self.status = Some(snapshot.status);
        }
        if snapshot.indeterminate {
            let _ = writeln!(out, "{}", "connection lost, state may be stale".red());
        }
        out
    }
}

fn format_message(message: &ChatMessage) -> String {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let role = match message.role {
        Role::User => "you".green().bold(),
        Role::Assistant => "agent".cyan().bold(),
        Role::System => "system".magenta().bold(),
    };
    let mut lines = message.content.lines();
    let mut out = format!(
        "{} {role} {}\n",
        time.to_string().dimmed(),
        lines.next().unwrap_or_default()
    );
    for line in lines {
        let _ = writeln!(out, "         {line}");
    }
    out
}

pub fn status_label(status: WorkflowStatus) -> ColoredString {
    let label = status.as_str().replace('_', " ");
    match status {
        WorkflowStatus::Completed => label.green().bold(),
        WorkflowStatus::Error => label.red().bold(),
        WorkflowStatus::AwaitingFeedback | WorkflowStatus::Paused => label.yellow().bold(),
        WorkflowStatus::Stopped => label.red(),
        WorkflowStatus::InProgress => label.cyan(),
        WorkflowStatus::Draft | WorkflowStatus::Pending => label.normal(),
    }
}

/// Full, non-incremental view of a snapshot.
pub fn summary(snapshot: &WorkflowSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", "Status:".bold(), status_label(snapshot.status));
    if let Some(step) = &snapshot.current_step {
        let _ = writeln!(out, "{} {step}", "Current step:".bold());
    }
    let _ = writeln!(
        out,
        "{} {:.2}% ({}/{} categories)",
        "Progress:".bold(),
        snapshot.progress_percentage,
        snapshot.categories_completed,
        snapshot.total_categories
    );

    if !snapshot.steps.is_empty() {
        let _ = writeln!(out, "\n{}", "Steps".bold().underline());
        for step in &snapshot.steps {
            let mark = match step.status {
                StepStatus::Running => "~".yellow(),
                StepStatus::Completed => "✓".green(),
                StepStatus::Error => "✗".red(),
            };
            let _ = writeln!(out, "  {mark} {}", step.title);
            for substep in &step.substeps {
                let _ = writeln!(
                    out,
                    "      {}",
                    truncate_with_ellipsis(&substep.text, 100).dimmed()
                );
            }
        }
    }

    if !snapshot.categories.is_empty() {
        let _ = writeln!(out, "\n{}", "Categories".bold().underline());
        for row in &snapshot.categories {
            let status = match row.status {
                CategoryStatus::Pending => "pending".normal(),
                CategoryStatus::InProgress => "in progress".cyan(),
                CategoryStatus::Completed => "completed".green(),
            };
            let _ = writeln!(
                out,
                "  {:<32} {status} ({} searches)",
                row.category_name, row.search_iterations
            );
        }
    }

    if let Some(prompt) = &snapshot.gate.prompt {
        let _ = writeln!(out, "\n{} {prompt}", "Awaiting feedback:".yellow().bold());
    }
    if let Some(analysis) = &snapshot.final_analysis {
        let _ = writeln!(out, "\n{}\n{analysis}", "Final analysis".bold().underline());
    }
    out
}
