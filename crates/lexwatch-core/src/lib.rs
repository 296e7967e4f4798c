//! # lexwatch-core
//!
//! Streaming workflow state reconstruction for the Lexwatch console.
//!
//! This crate provides:
//! - Decoding of raw stream frames into typed workflow events
//! - Reducers that rebuild the step tree, category progress, feedback gate,
//!   lifecycle status and chat transcript from those events
//! - The case-scoped transport adapter and its websocket implementation
//! - A client for the case/analysis REST collaborator
//! - `CaseSession`, which ties one connection to one projection
//! - Status artifacts, a decision audit log and frame recording/replay

pub mod api_client;
pub mod audit_logger;
mod category_tracker;
mod config;
pub mod decoder;
mod feedback_gate;
mod lifecycle;
mod segmenter;
mod session;
#[cfg(feature = "recording")]
mod session_recorder;
pub mod status_manager;
pub mod testing;
mod text;
mod transcript;
pub mod transport;
mod workflow_state;

pub use api_client::{ApiError, CaseApi, HealthReport, HttpCaseApi};
pub use audit_logger::AuditLogger;
pub use category_tracker::CategoryTracker;
pub use config::{
    ArtifactsConfig, BackendConfig, ConfigError, ConsoleConfig, DEFAULT_CONFIG_FILE,
    SegmentationConfig, TranscriptConfig,
};
pub use decoder::{ControlFrame, Frame, Inbound, decode};
pub use feedback_gate::{DEFAULT_APPROVAL, FeedbackDecision, FeedbackGate, GateState};
pub use lifecycle::{Connectivity, LifecycleAction, LifecycleController};
pub use segmenter::{PhaseSegmenter, SegmentOutcome, SegmentationRules};
pub use session::{CaseSession, SessionEvent};
#[cfg(feature = "recording")]
pub use session_recorder::SessionRecorder;
pub use status_manager::StatusManager;
pub use text::{single_line, truncate_with_ellipsis};
pub use transcript::TranscriptBuilder;
pub use transport::{
    CaseConnection, Connector, Transport, TransportError, TransportEvent, WebSocketConnector,
};
pub use workflow_state::{GateSnapshot, WorkflowSnapshot, WorkflowState};
