//! Category progress tracking.

use chrono::{DateTime, Utc};
use lexwatch_proto::{
    AnalysisRecord, Category, CategoryProgress, CategoryStatus, ProgressSnapshot, WorkflowEvent,
};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Row {
    progress: CategoryProgress,
    descriptor: Option<Category>,
    /// Created from a bare count; renamed when the real name arrives.
    placeholder: bool,
    /// Discovered after the plan was fixed.
    late: bool,
}

impl Row {
    fn new(name: &str, descriptor: Option<Category>) -> Self {
        Self {
            progress: CategoryProgress::pending(name),
            descriptor,
            placeholder: false,
            late: false,
        }
    }

    fn placeholder(index: usize) -> Self {
        Self {
            placeholder: true,
            ..Self::new(&format!("Category {index}"), None)
        }
    }
}

/// Reducer mapping category name to progress.
///
/// Rows keep plan order. The total is fixed by the first `plan_generated`;
/// names outside the plan are still recorded.
#[derive(Debug, Clone, Default)]
pub struct CategoryTracker {
    rows: Vec<Row>,
    total_fixed: Option<usize>,
    advisory_total: Option<usize>,
    /// Completions that arrived before any plan.
    buffered: Vec<(Category, DateTime<Utc>)>,
}

impl CategoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &WorkflowEvent, at: DateTime<Utc>) {
        match event {
            WorkflowEvent::PlanGenerated {
                total_categories,
                categories,
            } => self.plan(*total_categories, categories),
            WorkflowEvent::FeedbackRequested { categories, .. } => {
                for category in categories {
                    self.register(category);
                }
                self.flush_matching();
            }
            WorkflowEvent::CategoryCompleted { categories } => {
                for category in categories {
                    if self.total_fixed.is_none() && self.find(&category.name).is_none() {
                        debug!(category = %category.name, "buffering completion until plan arrives");
                        self.buffered.push((category.clone(), at));
                    } else {
                        self.complete(category, at);
                    }
                }
            }
            WorkflowEvent::ResearchProgress { message } => self.mark_mentioned(message, at, true),
            WorkflowEvent::ProgressUpdate { message, snapshot } => {
                self.observe_snapshot(snapshot);
                if let Some(message) = message {
                    self.mark_mentioned(message, at, false);
                }
            }
            WorkflowEvent::AnalysisCompleted {
                completed_categories,
                ..
            } => {
                for category in completed_categories {
                    self.complete(category, at);
                }
                self.flush_all();
            }
            WorkflowEvent::DepositionGenerated { .. }
            | WorkflowEvent::Error { .. }
            | WorkflowEvent::Unknown { .. } => {}
        }
    }

    fn plan(&mut self, total: usize, categories: &[Category]) {
        if let Some(fixed) = self.total_fixed {
            if fixed != total {
                warn!(fixed, announced = total, "plan re-announced with a different total, keeping the first");
            }
        } else {
            self.total_fixed = Some(total.max(categories.len()));
        }

        for category in categories {
            self.register(category);
        }
        let target = self.total_fixed.unwrap_or(total);
        while self.rows.len() < target {
            let index = self.rows.len() + 1;
            self.rows.push(Row::placeholder(index));
        }
        self.flush_all();
    }

    /// Adds or enriches the row for a named category.
    fn register(&mut self, category: &Category) {
        if let Some(row) = self.find_mut(&category.name) {
            row.descriptor = Some(category.clone());
            return;
        }
        if let Some(row) = self.rows.iter_mut().find(|r| {
            r.placeholder && r.progress.status == CategoryStatus::Pending
        }) {
            row.progress.category_name.clone_from(&category.name);
            row.descriptor = Some(category.clone());
            row.placeholder = false;
            return;
        }
        let mut row = Row::new(&category.name, Some(category.clone()));
        if self.total_fixed.is_some_and(|total| self.rows.len() >= total) {
            warn!(category = %category.name, "category not in the analysis plan, recording anyway");
            row.late = true;
        }
        self.rows.push(row);
    }

    fn complete(&mut self, category: &Category, at: DateTime<Utc>) {
        if self.find(&category.name).is_none() {
            self.register(category);
        }
        let Some(row) = self.find_mut(&category.name) else {
            return;
        };
        let progress = &mut row.progress;
        if progress.is_completed() {
            debug!(category = %category.name, "category already completed");
        } else {
            progress.status = CategoryStatus::Completed;
            progress.completed_at = Some(at);
            if progress.started_at.is_none() {
                progress.started_at = Some(at);
            }
        }
        if let Some(content) = category.content.as_ref().filter(|c| !c.trim().is_empty()) {
            progress.content = Some(content.clone());
        }
    }

    fn mark_mentioned(&mut self, message: &str, at: DateTime<Utc>, research: bool) {
        let lower = message.to_lowercase();
        for row in &mut self.rows {
            if row.placeholder || row.progress.is_completed() {
                continue;
            }
            if !lower.contains(&row.progress.category_name.to_lowercase()) {
                continue;
            }
            let progress = &mut row.progress;
            if progress.status == CategoryStatus::Pending {
                progress.status = CategoryStatus::InProgress;
                progress.started_at = Some(at);
            }
            if research {
                progress.search_iterations += 1;
            }
        }
    }

    fn observe_snapshot(&mut self, snapshot: &ProgressSnapshot) {
        if let Some(total) = snapshot.total_categories.filter(|t| *t > 0) {
            self.advisory_total = Some(total);
        }
    }

    fn flush_matching(&mut self) {
        let pending = std::mem::take(&mut self.buffered);
        for (category, stamped) in pending {
            if self.find(&category.name).is_some() {
                self.complete(&category, stamped);
            } else {
                self.buffered.push((category, stamped));
            }
        }
    }

    fn flush_all(&mut self) {
        let pending = std::mem::take(&mut self.buffered);
        for (category, stamped) in pending {
            self.complete(&category, stamped);
        }
    }

    /// Restores rows from a REST analysis record.
    pub fn seed(&mut self, record: &AnalysisRecord) {
        if !self.rows.is_empty() {
            return;
        }
        for category in &record.categories {
            self.register(category);
        }
        for stored in &record.category_progress {
            if self.find(&stored.category_name).is_none() {
                self.register(&Category::named(&stored.category_name));
            }
            if let Some(row) = self.find_mut(&stored.category_name) {
                row.progress.status = parse_status(&stored.status);
                row.progress.content.clone_from(&stored.content);
                row.progress.search_iterations = stored.search_iterations;
                row.progress.started_at = stored.started_at;
                row.progress.completed_at = stored.completed_at;
            }
        }
        let total = record
            .total_categories
            .unwrap_or(0)
            .max(record.categories.len());
        if total > 0 {
            self.total_fixed = Some(total);
            while self.rows.len() < total {
                let index = self.rows.len() + 1;
                self.rows.push(Row::placeholder(index));
            }
        }
    }

    fn find(&self, name: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.progress.category_name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Row> {
        self.rows
            .iter_mut()
            .find(|r| r.progress.category_name == name)
    }

    pub fn get(&self, name: &str) -> Option<&CategoryProgress> {
        self.find(name).map(|r| &r.progress)
    }

    pub fn descriptor(&self, name: &str) -> Option<&Category> {
        self.find(name).and_then(|r| r.descriptor.as_ref())
    }

    pub fn rows(&self) -> Vec<CategoryProgress> {
        self.rows.iter().map(|r| r.progress.clone()).collect()
    }

    /// Names recorded after the plan was fixed.
    pub fn late_categories(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| r.late)
            .map(|r| r.progress.category_name.as_str())
            .collect()
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    pub fn completed_count(&self) -> usize {
        self.rows.iter().filter(|r| r.progress.is_completed()).count()
    }

    /// The plan's total once a plan has been seen; late categories do not
    /// change it.
    pub fn total(&self) -> usize {
        if let Some(fixed) = self.total_fixed {
            return fixed;
        }
        self.advisory_total
            .unwrap_or(self.rows.len())
            .max(self.rows.len())
    }

    /// Completed over total as a percentage, rounded to two decimals.
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let pct = (self.completed_count() as f64 / total as f64 * 100.0).min(100.0);
        (pct * 100.0).round() / 100.0
    }
}

fn parse_status(status: &str) -> CategoryStatus {
    match status {
        "completed" | "complete" | "done" => CategoryStatus::Completed,
        "in_progress" | "running" | "analyzing" => CategoryStatus::InProgress,
        _ => CategoryStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lexwatch_proto::CategoryProgressRecord;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap()
    }

    fn plan(names: &[&str]) -> WorkflowEvent {
        WorkflowEvent::PlanGenerated {
            total_categories: names.len(),
            categories: names.iter().map(|n| Category::named(*n)).collect(),
        }
    }

    fn completed(names: &[&str]) -> WorkflowEvent {
        WorkflowEvent::CategoryCompleted {
            categories: names.iter().map(|n| Category::named(*n)).collect(),
        }
    }

    #[test]
    fn test_plan_creates_pending_rows() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(&plan(&["Liability", "Damages", "Witnesses"]), at(0));

        let rows = tracker.rows();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.status == CategoryStatus::Pending));
        assert_eq!(tracker.total(), 3);
    }

    #[test]
    fn test_count_only_plan_creates_placeholders() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(
            &WorkflowEvent::PlanGenerated {
                total_categories: 3,
                categories: Vec::new(),
            },
            at(0),
        );
        assert_eq!(tracker.rows()[2].category_name, "Category 3");

        tracker.apply(&completed(&["Damages"]), at(5));
        let rows = tracker.rows();
        assert_eq!(rows[0].category_name, "Damages");
        assert_eq!(rows[0].status, CategoryStatus::Completed);
        assert_eq!(rows[1].status, CategoryStatus::Pending);
        assert!(tracker.late_categories().is_empty());
    }

    #[test]
    fn test_completion_stamps_once_and_keeps_content() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(&plan(&["Damages"]), at(0));
        tracker.apply(
            &WorkflowEvent::CategoryCompleted {
                categories: vec![Category::named("Damages").with_content("Lost wages")],
            },
            at(3),
        );
        tracker.apply(&completed(&["Damages"]), at(9));

        let row = tracker.get("Damages").unwrap();
        assert_eq!(row.completed_at, Some(at(3)));
        assert_eq!(row.content.as_deref(), Some("Lost wages"));
        assert_eq!(tracker.completed_count(), 1);
    }

    #[test]
    fn test_progress_percentage_two_of_three() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(&plan(&["A", "B", "C"]), at(0));
        tracker.apply(&completed(&["A", "B"]), at(1));

        assert_eq!(tracker.completed_count(), 2);
        assert!((tracker.progress_percentage() - 66.67).abs() < 1e-9);
    }

    #[test]
    fn test_progress_percentage_zero_total() {
        assert!(CategoryTracker::new().progress_percentage().abs() < f64::EPSILON);
    }

    #[test]
    fn test_late_category_is_recorded() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(&plan(&["A", "B"]), at(0));
        tracker.apply(&completed(&["Spoliation"]), at(2));

        assert_eq!(tracker.rows().len(), 3);
        assert_eq!(tracker.late_categories(), vec!["Spoliation"]);
        assert_eq!(tracker.total(), 2);
        assert_eq!(tracker.completed_count(), 1);
        assert!((tracker.progress_percentage() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_late_categories_keep_percentage_within_plan() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(&plan(&["A", "B"]), at(0));
        tracker.apply(&completed(&["A", "B"]), at(1));
        tracker.apply(&completed(&["Spoliation"]), at(2));

        assert_eq!(tracker.total(), 2);
        assert_eq!(tracker.rows().len(), 3);
        assert!((tracker.progress_percentage() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_completion_before_plan_is_buffered() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(&completed(&["Damages"]), at(1));
        assert_eq!(tracker.buffered_count(), 1);
        assert!(tracker.rows().is_empty());

        tracker.apply(&plan(&["Liability", "Damages"]), at(2));
        assert_eq!(tracker.buffered_count(), 0);
        let row = tracker.get("Damages").unwrap();
        assert!(row.is_completed());
        assert_eq!(row.completed_at, Some(at(1)));
    }

    #[test]
    fn test_research_mentions_mark_in_progress() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(&plan(&["Damages", "Liability"]), at(0));
        let research = WorkflowEvent::ResearchProgress {
            message: "Round 1: searching documents for damages".into(),
        };
        tracker.apply(&research, at(1));
        tracker.apply(&research, at(2));

        let row = tracker.get("Damages").unwrap();
        assert_eq!(row.status, CategoryStatus::InProgress);
        assert_eq!(row.search_iterations, 2);
        assert_eq!(row.started_at, Some(at(1)));
        assert_eq!(tracker.get("Liability").unwrap().status, CategoryStatus::Pending);
    }

    #[test]
    fn test_advisory_total_without_plan() {
        let mut tracker = CategoryTracker::new();
        tracker.apply(
            &WorkflowEvent::ProgressUpdate {
                message: None,
                snapshot: ProgressSnapshot {
                    total_categories: Some(4),
                    ..ProgressSnapshot::default()
                },
            },
            at(0),
        );
        assert_eq!(tracker.total(), 4);

        tracker.apply(&plan(&["A", "B"]), at(1));
        assert_eq!(tracker.total(), 2);
    }

    #[test]
    fn test_seed_from_analysis_record() {
        let record = AnalysisRecord {
            id: "a-1".into(),
            status: "in_progress".into(),
            current_step: Some("research".into()),
            categories: vec![Category::named("Damages"), Category::named("Liability")],
            category_progress: vec![CategoryProgressRecord {
                category_name: "Damages".into(),
                status: "completed".into(),
                content: Some("Lost wages".into()),
                search_iterations: 3,
                started_at: None,
                completed_at: Some(at(4)),
            }],
            total_categories: None,
            feedback_requested: false,
            feedback_message: None,
            final_analysis: None,
            created_at: None,
        };
        let mut tracker = CategoryTracker::new();
        tracker.seed(&record);

        assert_eq!(tracker.total(), 2);
        assert_eq!(tracker.completed_count(), 1);
        assert_eq!(tracker.get("Damages").unwrap().search_iterations, 3);
        assert!(tracker.descriptor("Liability").is_some());
    }
}
