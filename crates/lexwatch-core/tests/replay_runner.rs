//! Integration tests replaying recorded frame streams.

use chrono::{TimeZone, Utc};
use lexwatch_core::testing::{ReplayConfig, ReplayResult, ReplayRunner, list_fixtures};
use lexwatch_core::{ConsoleConfig, GateState};
use lexwatch_proto::{CategoryStatus, DepositionQuestions, Role, StepStatus, WorkflowStatus};
use std::path::PathBuf;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn replay(name: &str) -> ReplayResult {
    let config = ReplayConfig::new(fixtures_dir().join(name));
    ReplayRunner::run(&config).expect("fixture should replay")
}

#[test]
fn test_fixture_discovery() {
    let fixtures = list_fixtures(fixtures_dir()).expect("should list fixtures");
    let names: Vec<_> = fixtures
        .iter()
        .filter_map(|p| p.file_name()?.to_str())
        .collect();
    assert!(names.contains(&"phase_segmentation.jsonl"), "got {names:?}");
    assert!(names.contains(&"plan_to_completion.jsonl"), "got {names:?}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Step tree
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_rounds_collapse_into_three_steps() {
    let result = replay("phase_segmentation.jsonl");
    let snapshot = result.snapshot();

    assert_eq!(result.frames_read(), 8);
    assert_eq!(result.control_frames(), 2);
    assert_eq!(result.malformed_count(), 0);

    let titles: Vec<_> = snapshot.steps.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Loading case documents", "Research round 1", "Research round 2"]
    );
    assert!(
        snapshot
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Completed)
    );

    // The round-1 trigger is the step itself, the redelivered substep appears once.
    let round_one = &snapshot.steps[1];
    assert_eq!(round_one.substeps.len(), 1);
    assert_eq!(round_one.substeps[0].text, "Round 1: reviewing supply contract");

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.current_step.as_deref(), Some("Research round 2"));
}

#[test]
fn test_naive_timestamps_stamp_transcript_as_utc() {
    let snapshot = replay("phase_segmentation.jsonl").into_snapshot();
    let first = snapshot.transcript.first().expect("transcript entry");
    assert_eq!(first.content, "Loading case documents");
    assert_eq!(
        first.timestamp,
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 1).unwrap()
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Categories and completion
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_plan_to_completion() {
    let snapshot = replay("plan_to_completion.jsonl").into_snapshot();

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.total_categories, 3);
    assert_eq!(snapshot.categories_completed, 3);
    assert!((snapshot.progress_percentage - 100.0).abs() < f64::EPSILON);

    let damages = snapshot
        .categories
        .iter()
        .find(|c| c.category_name == "Damages")
        .expect("damages row");
    assert_eq!(damages.status, CategoryStatus::Completed);
    assert_eq!(damages.search_iterations, 1);
    assert_eq!(
        damages.content.as_deref(),
        Some("Lost profits of roughly $2.1M.")
    );
    assert_eq!(
        damages.completed_at,
        Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 2, 0).unwrap())
    );

    let finals = snapshot
        .transcript
        .iter()
        .filter(|m| m.role == Role::Assistant && m.content.starts_with("Final analysis:"))
        .count();
    assert_eq!(finals, 1, "final analysis must be appended exactly once");

    assert!(matches!(
        snapshot.deposition_questions,
        Some(DepositionQuestions::Structured(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Gate, errors, malformed input
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_feedback_gate_holds_the_current_step() {
    let snapshot = replay("feedback_gate.jsonl").into_snapshot();

    assert_eq!(snapshot.status, WorkflowStatus::AwaitingFeedback);
    assert_eq!(snapshot.gate.state, GateState::AwaitingResponse);
    assert_eq!(
        snapshot.gate.prompt.as_deref(),
        Some("Please review the analysis plan")
    );
    assert_eq!(snapshot.steps.len(), 1);
    assert_eq!(snapshot.steps[0].status, StepStatus::Running);
    assert_eq!(snapshot.steps[0].substeps.len(), 3);
}

#[test]
fn test_backend_error_is_terminal() {
    let snapshot = replay("backend_error.jsonl").into_snapshot();

    assert_eq!(snapshot.status, WorkflowStatus::Error);
    assert_eq!(snapshot.steps.len(), 1);
    assert_eq!(snapshot.steps[0].status, StepStatus::Error);
    assert_eq!(snapshot.final_analysis, None);

    let last = snapshot.transcript.last().expect("error message");
    assert_eq!(last.role, Role::System);
    assert_eq!(
        last.content,
        "Document index unavailable: timed out after 30s"
    );
    assert!(
        !snapshot
            .transcript
            .iter()
            .any(|m| m.content.contains("should never appear"))
    );
}

#[test]
fn test_malformed_frames_do_not_advance_state() {
    let result = replay("malformed_frames.jsonl");

    assert_eq!(result.frames_read(), 7);
    assert_eq!(result.malformed_count(), 4);
    assert_eq!(result.events_applied(), 2);

    let lines: Vec<_> = result.malformed().iter().map(|m| m.line).collect();
    assert_eq!(lines, vec![3, 4, 5, 6]);

    let snapshot = result.snapshot();
    assert_eq!(snapshot.status, WorkflowStatus::InProgress);
    assert_eq!(snapshot.steps.len(), 2);
}

#[test]
fn test_custom_segmentation_titles() {
    let console = ConsoleConfig::parse_yaml(
        "segmentation:\n  research_title: \"Search pass {round}\"\n",
    )
    .expect("valid config");
    let config = ReplayConfig::new(fixtures_dir().join("phase_segmentation.jsonl"))
        .with_console(console);
    let result = ReplayRunner::run(&config).expect("fixture should replay");

    let titles: Vec<_> = result
        .snapshot()
        .steps
        .iter()
        .map(|s| s.title.clone())
        .collect();
    assert_eq!(titles[1], "Search pass 1");
    assert_eq!(titles[2], "Search pass 2");
}
