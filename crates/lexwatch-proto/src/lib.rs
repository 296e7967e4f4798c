//! # lexwatch-proto
//!
//! Shared types and error definitions for the Lexwatch console.
//!
//! This crate provides the vocabulary every other Lexwatch crate speaks:
//! - `WorkflowEvent`, the typed form of one inbound frame from the agent
//! - `Command`, the outbound control messages sent back over the socket
//! - The projected state types (`Step`, `CategoryProgress`, `ChatMessage`,
//!   `WorkflowStatus`) handed to the presentation layer
//! - REST records returned by the case/analysis API
//! - The error taxonomy shared by the engine and its adapters

mod analysis;
mod category;
mod command;
mod error;
mod event;
mod message;
mod status;
mod step;

pub use analysis::{AnalysisRecord, CaseRecord, CategoryProgressRecord, StartedAnalysis};
pub use category::{CategoryProgress, CategoryStatus};
pub use command::Command;
pub use error::{Error, Result};
pub use event::{Category, DepositionQuestions, ProgressSnapshot, WorkflowEvent};
pub use message::{ChatMessage, Role};
pub use status::WorkflowStatus;
pub use step::{Step, StepStatus, SubStep, SubStepKind};
