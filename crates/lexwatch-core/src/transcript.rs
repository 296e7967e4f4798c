//! Chat transcript builder.
//!
//! Messages are append-only and fixed at creation.

use crate::config::TranscriptConfig;
use crate::segmenter::category_names;
use chrono::{DateTime, Utc};
use lexwatch_proto::{ChatMessage, Error, Result, Role, WorkflowEvent};
use serde_json::json;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct TranscriptBuilder {
    collapse_repeats: bool,
    messages: Vec<ChatMessage>,
}

impl Default for TranscriptBuilder {
    fn default() -> Self {
        Self::new(&TranscriptConfig::default())
    }
}

impl TranscriptBuilder {
    pub fn new(config: &TranscriptConfig) -> Self {
        Self {
            collapse_repeats: config.collapse_repeats,
            messages: Vec::new(),
        }
    }

    /// Appends the message an event renders as, if it renders as one.
    pub fn apply(&mut self, event: &WorkflowEvent, at: DateTime<Utc>) -> Option<&ChatMessage> {
        let (role, content, metadata) = render(event)?;
        if self.collapse_repeats
            && role == Role::Assistant
            && self
                .messages
                .last()
                .is_some_and(|last| last.role == role && last.content == content)
        {
            trace!(kind = event.kind(), "collapsing repeated assistant message");
            return None;
        }
        Some(self.push(role, content, metadata, at))
    }

    /// Records text typed by the human. Happens before any network call.
    pub fn user_message(&mut self, text: &str, at: DateTime<Utc>) -> Result<&ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }
        Ok(self.push(Role::User, text.to_string(), None, at))
    }

    pub fn system_note(&mut self, text: impl Into<String>, at: DateTime<Utc>) -> &ChatMessage {
        self.push(Role::System, text.into(), None, at)
    }

    fn push(
        &mut self,
        role: Role,
        content: String,
        metadata: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> &ChatMessage {
        let id = format!("msg-{}", self.messages.len() + 1);
        self.messages.push(ChatMessage {
            id,
            role,
            content,
            timestamp: at,
            metadata,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

type Rendered = (Role, String, Option<serde_json::Value>);

fn render(event: &WorkflowEvent) -> Option<Rendered> {
    let rendered = match event {
        WorkflowEvent::PlanGenerated {
            total_categories,
            categories,
        } => {
            let content = if categories.is_empty() {
                format!("I've created an analysis plan with {total_categories} categories.")
            } else {
                format!(
                    "I've created an analysis plan with {total_categories} categories: {}.",
                    category_names(categories)
                )
            };
            (
                Role::Assistant,
                content,
                Some(json!({ "type": event.kind(), "total_categories": total_categories })),
            )
        }
        WorkflowEvent::FeedbackRequested {
            message,
            categories,
        } => (
            Role::Assistant,
            message.clone(),
            Some(json!({
                "type": event.kind(),
                "requires_feedback": true,
                "categories": categories,
            })),
        ),
        WorkflowEvent::CategoryCompleted { categories } => {
            if categories.is_empty() {
                return None;
            }
            (
                Role::Assistant,
                format!("Completed analysis of: {}", category_names(categories)),
                None,
            )
        }
        WorkflowEvent::ProgressUpdate { .. } | WorkflowEvent::ResearchProgress { .. } => {
            (Role::Assistant, event.message()?.to_string(), None)
        }
        WorkflowEvent::DepositionGenerated { questions } => (
            Role::Assistant,
            "Deposition questions have been generated.".to_string(),
            questions
                .as_ref()
                .map(|q| json!({ "type": event.kind(), "deposition_questions": q })),
        ),
        WorkflowEvent::AnalysisCompleted {
            final_analysis,
            completed_categories,
            deposition_questions,
        } => (
            Role::Assistant,
            final_analysis.clone(),
            Some(json!({
                "type": event.kind(),
                "completed_categories": completed_categories.len(),
                "has_deposition_questions": deposition_questions.is_some(),
            })),
        ),
        WorkflowEvent::Error { message } => (Role::System, message.clone(), None),
        WorkflowEvent::Unknown { .. } => return None,
    };
    Some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexwatch_proto::{Category, ProgressSnapshot};

    fn builder() -> TranscriptBuilder {
        TranscriptBuilder::new(&TranscriptConfig::default())
    }

    #[test]
    fn test_progress_without_message_is_silent() {
        let mut transcript = builder();
        let event = WorkflowEvent::ProgressUpdate {
            message: None,
            snapshot: ProgressSnapshot::default(),
        };
        assert!(transcript.apply(&event, Utc::now()).is_none());
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_error_is_verbatim_system_message() {
        let mut transcript = builder();
        let event = WorkflowEvent::Error {
            message: "Vector store timeout".into(),
        };
        let message = transcript.apply(&event, Utc::now()).unwrap();
        assert_eq!(message.role, Role::System);
        assert_eq!(message.content, "Vector store timeout");
    }

    #[test]
    fn test_final_analysis_message() {
        let mut transcript = builder();
        let event = WorkflowEvent::AnalysisCompleted {
            final_analysis: "## Summary\nStrong liability case.".into(),
            completed_categories: vec![Category::named("Liability")],
            deposition_questions: None,
        };
        let message = transcript.apply(&event, Utc::now()).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert!(message.content.contains("Strong liability case"));
        assert_eq!(message.metadata.as_ref().unwrap()["completed_categories"], 1);
    }

    #[test]
    fn test_user_message_is_trimmed_and_empty_rejected() {
        let mut transcript = builder();
        assert!(matches!(
            transcript.user_message("  ", Utc::now()),
            Err(Error::EmptyMessage)
        ));
        let message = transcript.user_message(" add damages ", Utc::now()).unwrap();
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "add damages");
        assert_eq!(message.id, "msg-1");
    }

    #[test]
    fn test_repeated_assistant_messages_collapse() {
        let mut transcript = builder();
        let event = WorkflowEvent::ResearchProgress {
            message: "Searching emails".into(),
        };
        transcript.apply(&event, Utc::now());
        transcript.apply(&event, Utc::now());
        assert_eq!(transcript.len(), 1);

        let mut verbose = TranscriptBuilder::new(&TranscriptConfig {
            collapse_repeats: false,
        });
        verbose.apply(&event, Utc::now());
        verbose.apply(&event, Utc::now());
        assert_eq!(verbose.len(), 2);
    }
}
