//! Frame decoding.
//!
//! Turns one raw transport frame (a JSON object with a mandatory `type`
//! field) into a typed value:
//! ```text
//! {"type": "research_progress", "message": "Round 2: searching depositions"}
//! {"type": "subscribed_to_case", "case_id": "case-42"}
//! ```
//! Workflow events become `WorkflowEvent`s; connection bookkeeping frames
//! sent by the websocket manager become `ControlFrame`s and never reach the
//! workflow reducers. Decoding is pure.

use chrono::{DateTime, NaiveDateTime, Utc};
use lexwatch_proto::{
    Category, DepositionQuestions, Error, ProgressSnapshot, Result, WorkflowEvent,
};
use serde::Deserialize;
use serde_json::Value;

/// Connection bookkeeping frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    ConnectionEstablished { client_id: Option<String> },
    /// Acknowledges `subscribe_case`.
    Subscribed { case_id: Option<String> },
    Unsubscribed { case_id: Option<String> },
    Ping,
    Pong,
}

/// What a frame carried.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(WorkflowEvent),
    Control(ControlFrame),
}

/// A decoded frame plus the backend timestamp, when it sent one.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub inbound: Inbound,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Frame {
    /// Returns the workflow event, if this frame carried one.
    pub fn event(&self) -> Option<&WorkflowEvent> {
        match &self.inbound {
            Inbound::Event(event) => Some(event),
            Inbound::Control(_) => None,
        }
    }

    pub fn into_event(self) -> Option<WorkflowEvent> {
        match self.inbound {
            Inbound::Event(event) => Some(event),
            Inbound::Control(_) => None,
        }
    }
}

/// Frame types whose fields are read; anything else is kept verbatim.
const RECOGNISED_TYPES: &[&str] = &[
    "connection_established",
    "subscribed_to_case",
    "subscribed",
    "unsubscribed_from_case",
    "ping",
    "pong",
    "plan_generated",
    "feedback_requested",
    "category_completed",
    "progress_update",
    "research_progress",
    "deposition_generated",
    "analysis_completed",
    "error",
];

/// Categories arrive either as descriptor objects or as bare names.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireCategory {
    Name(String),
    Descriptor(Category),
}

impl From<WireCategory> for Category {
    fn from(wire: WireCategory) -> Self {
        match wire {
            WireCategory::Name(name) => Category::named(name),
            WireCategory::Descriptor(category) => category,
        }
    }
}

/// Wire shape shared by every frame type; fields are read per tag.
#[derive(Deserialize)]
struct WireFrame {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    categories: Option<Vec<WireCategory>>,
    #[serde(default)]
    total_categories: Option<usize>,
    #[serde(default)]
    final_analysis: Option<String>,
    #[serde(default)]
    completed_categories: Option<Vec<WireCategory>>,
    #[serde(default)]
    deposition_questions: Option<DepositionQuestions>,
    #[serde(default)]
    questions: Option<DepositionQuestions>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    current_step: Option<String>,
    #[serde(default)]
    progress_percentage: Option<f64>,
    #[serde(default)]
    categories_completed: Option<usize>,
    #[serde(default)]
    case_id: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
}

fn categories(wire: Option<Vec<WireCategory>>) -> Vec<Category> {
    wire.unwrap_or_default().into_iter().map(Category::from).collect()
}

/// Decodes a raw frame from text or bytes.
///
/// Fails with `Error::MalformedFrame` when the payload is not a JSON object
/// with a string `type`, or when a recognised type carries fields of the
/// wrong shape. Unrecognised types decode to `WorkflowEvent::Unknown`.
pub fn decode(frame: impl AsRef<[u8]>) -> Result<Frame> {
    let bytes = frame.as_ref();
    let value: Value = serde_json::from_slice(bytes).map_err(|e| Error::MalformedFrame {
        reason: format!("not valid JSON: {e}"),
    })?;

    let Some(object) = value.as_object() else {
        return Err(Error::MalformedFrame {
            reason: "frame is not a JSON object".to_string(),
        });
    };
    let Some(kind) = object.get("type").and_then(Value::as_str) else {
        return Err(Error::MalformedFrame {
            reason: "missing string `type` discriminator".to_string(),
        });
    };
    let kind = kind.to_string();
    let timestamp = object
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    if !RECOGNISED_TYPES.contains(&kind.as_str()) {
        return Ok(Frame {
            inbound: Inbound::Event(WorkflowEvent::Unknown { raw: value }),
            timestamp,
        });
    }

    let wire: WireFrame =
        serde_json::from_value(value.clone()).map_err(|e| Error::MalformedFrame {
            reason: format!("`{kind}` frame has unexpected shape: {e}"),
        })?;

    let inbound = match kind.as_str() {
        "connection_established" => Inbound::Control(ControlFrame::ConnectionEstablished {
            client_id: wire.client_id,
        }),
        "subscribed_to_case" | "subscribed" => Inbound::Control(ControlFrame::Subscribed {
            case_id: wire.case_id,
        }),
        "unsubscribed_from_case" => Inbound::Control(ControlFrame::Unsubscribed {
            case_id: wire.case_id,
        }),
        "ping" => Inbound::Control(ControlFrame::Ping),
        "pong" => Inbound::Control(ControlFrame::Pong),
        _ => Inbound::Event(decode_event(&kind, wire, value)),
    };

    Ok(Frame { inbound, timestamp })
}

fn decode_event(kind: &str, wire: WireFrame, raw: Value) -> WorkflowEvent {
    match kind {
        "plan_generated" => {
            let categories = categories(wire.categories);
            let total_categories = wire
                .total_categories
                .unwrap_or(0)
                .max(categories.len());
            WorkflowEvent::PlanGenerated {
                total_categories,
                categories,
            }
        }
        "feedback_requested" => WorkflowEvent::FeedbackRequested {
            message: wire
                .message
                .unwrap_or_else(|| "Please review the analysis plan".to_string()),
            categories: categories(wire.categories),
        },
        "category_completed" => WorkflowEvent::CategoryCompleted {
            categories: categories(wire.categories),
        },
        "progress_update" => WorkflowEvent::ProgressUpdate {
            message: wire.message,
            snapshot: ProgressSnapshot {
                status: wire.status,
                current_step: wire.current_step,
                progress_percentage: wire.progress_percentage,
                categories_completed: wire.categories_completed,
                total_categories: wire.total_categories,
            },
        },
        "research_progress" => WorkflowEvent::ResearchProgress {
            message: wire.message.unwrap_or_default(),
        },
        "deposition_generated" => WorkflowEvent::DepositionGenerated {
            questions: wire.questions.or(wire.deposition_questions),
        },
        "analysis_completed" => WorkflowEvent::AnalysisCompleted {
            final_analysis: wire.final_analysis.unwrap_or_default(),
            completed_categories: categories(wire.completed_categories),
            deposition_questions: wire.deposition_questions,
        },
        "error" => WorkflowEvent::Error {
            message: wire
                .message
                .unwrap_or_else(|| "The analysis failed without details".to_string()),
        },
        _ => WorkflowEvent::Unknown { raw },
    }
}

/// Parses RFC 3339, or a naive ISO-8601 timestamp taken to be UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
