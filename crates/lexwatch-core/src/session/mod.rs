//! Case-scoped session.
//!
//! A `CaseSession` owns the single connection for one case view, feeds every
//! inbound frame through the decoder and the [`WorkflowState`] reducers in
//! arrival order, and turns human actions into outbound commands. There is
//! no internal task: the caller drives it by awaiting [`CaseSession::next_event`],
//! so no two consumers can ever process the same connection.

use crate::api_client::CaseApi;
use crate::audit_logger::AuditLogger;
use crate::config::{ConfigError, ConsoleConfig};
use crate::decoder::{ControlFrame, Inbound, decode};
use crate::feedback_gate::FeedbackDecision;
use crate::lifecycle::LifecycleAction;
#[cfg(feature = "recording")]
use crate::session_recorder::SessionRecorder;
use crate::status_manager::StatusManager;
use crate::text::{single_line, truncate_with_ellipsis};
use crate::transport::{CaseConnection, Connector, TransportEvent};
use crate::workflow_state::{WorkflowSnapshot, WorkflowState};
use chrono::Utc;
use lexwatch_proto::{Command, Error, Result, StartedAnalysis};
#[cfg(feature = "recording")]
use std::fs::File;
#[cfg(feature = "recording")]
use std::io::BufWriter;
use tracing::{debug, info, warn};


/// Callback invoked with the projection after every state change.
type Observer = Box<dyn Fn(&WorkflowSnapshot) + Send + 'static>;

/// Receives frames that failed to decode.
type ErrorSink = Box<dyn Fn(&str, &Error) + Send + 'static>;

/// What handling one transport item amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A workflow event changed the projection.
    Applied { kind: String },
    /// A workflow event was decoded but changed nothing.
    Ignored { kind: String },
    Control(ControlFrame),
    /// The frame could not be decoded and was dropped.
    Malformed { reason: String },
    /// The connection closed. The projection is kept.
    Disconnected { reason: String },
}

pub struct CaseSession {
    case_id: String,
    require_subscribe_ack: bool,
    /// Unused projection cloned when a new run starts.
    fresh: WorkflowState,
    state: WorkflowState,
    connection: Option<CaseConnection>,
    observers: Vec<Observer>,
    error_sink: Option<ErrorSink>,
    malformed_frames: usize,
    status: Option<StatusManager>,
    audit: Option<AuditLogger>,
    #[cfg(feature = "recording")]
    recorder: Option<SessionRecorder<BufWriter<File>>>,
}

impl std::fmt::Debug for CaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseSession")
            .field("case_id", &self.case_id)
            .field("status", &self.state.status())
            .field("connection", &self.connection)
            .field("observers", &self.observers.len())
            .field("malformed_frames", &self.malformed_frames)
            .finish_non_exhaustive()
    }
}

impl CaseSession {
    pub fn new(case_id: impl Into<String>, config: &ConsoleConfig) -> Result<Self, ConfigError> {
        let fresh = WorkflowState::new(config)?;
        Ok(Self {
            case_id: case_id.into(),
            require_subscribe_ack: config.backend.require_subscribe_ack,
            state: fresh.clone(),
            fresh,
            connection: None,
            observers: Vec::new(),
            error_sink: None,
            malformed_frames: 0,
            status: None,
            audit: None,
            #[cfg(feature = "recording")]
            recorder: None,
        })
    }

    /// Writes status artifacts into `manager`'s directory after each change.
    #[must_use]
    pub fn with_status_manager(mut self, manager: StatusManager) -> Self {
        self.status = Some(manager);
        self
    }

    #[must_use]
    pub fn with_audit_logger(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    #[cfg(feature = "recording")]
    #[must_use]
    pub fn with_recorder(mut self, recorder: SessionRecorder<BufWriter<File>>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Adds an observer that receives the snapshot after every change.
    pub fn add_observer<F>(&mut self, observer: F)
    where
        F: Fn(&WorkflowSnapshot) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Sets where malformed frames are reported. They are always logged.
    pub fn set_error_sink<F>(&mut self, sink: F)
    where
        F: Fn(&str, &Error) + Send + 'static,
    {
        self.error_sink = Some(Box::new(sink));
    }

    /// Seeds state from the REST collaborator. No-op once live events arrived.
    pub async fn seed_from(&mut self, api: &dyn CaseApi) -> Result<bool> {
        let case = api.get_case_analysis(&self.case_id).await?;
        let seeded = self.state.seed(&case);
        if seeded {
            self.notify();
        }
        Ok(seeded)
    }

    /// Opens the case connection and sends the subscription.
    ///
    /// An existing connection is closed first; the projection is kept.
    pub async fn connect(&mut self, connector: &dyn Connector) -> Result<()> {
        if let Some(mut previous) = self.connection.take() {
            previous.close().await;
        }
        let connection = CaseConnection::connect(
            connector,
            &self.case_id,
            self.require_subscribe_ack,
        )
        .await?;
        self.connection = Some(connection);
        self.state.connection_established(Utc::now());
        info!(case_id = %self.case_id, "case connection open");
        self.notify();
        Ok(())
    }

    /// Waits for and handles the next transport item.
    ///
    /// Returns `None` when there is no connection.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let connection = self.connection.as_mut()?;
        if connection.is_closed() {
            return None;
        }
        let event = connection.next_event().await;
        Some(self.handle(event))
    }

    /// Handles one transport item.
    pub fn handle(&mut self, event: TransportEvent) -> SessionEvent {
        match event {
            TransportEvent::Frame(text) => self.handle_frame(&text),
            TransportEvent::Disconnected { reason } => {
                warn!(case_id = %self.case_id, %reason, "case connection lost");
                self.state.connection_lost(&reason, Utc::now());
                self.notify();
                SessionEvent::Disconnected { reason }
            }
        }
    }

    /// Decodes one raw frame and applies it.
    pub fn handle_frame(&mut self, text: &str) -> SessionEvent {
        self.record(text);
        let frame = match decode(text) {
            Ok(frame) => frame,
            Err(err) => {
                self.malformed_frames += 1;
                warn!(
                    case_id = %self.case_id,
                    error = %err,
                    frame = %truncate_with_ellipsis(&single_line(text), 200),
                    "dropping malformed frame"
                );
                if let Some(sink) = &self.error_sink {
                    sink(text, &err);
                }
                return SessionEvent::Malformed {
                    reason: err.to_string(),
                };
            }
        };

        let at = frame.timestamp.unwrap_or_else(Utc::now);
        match frame.inbound {
            Inbound::Control(control) => {
                self.handle_control(&control);
                SessionEvent::Control(control)
            }
            Inbound::Event(event) => {
                let kind = event.kind().to_string();
                if self.state.apply(&event, at) {
                    self.notify();
                    SessionEvent::Applied { kind }
                } else {
                    SessionEvent::Ignored { kind }
                }
            }
        }
    }

    fn handle_control(&mut self, control: &ControlFrame) {
        match control {
            ControlFrame::Subscribed { case_id } => {
                if let Some(connection) = self.connection.as_mut() {
                    connection.acknowledge(case_id.as_deref());
                }
            }
            ControlFrame::Unsubscribed { case_id } => {
                debug!(case_id = ?case_id, "backend dropped the case subscription");
            }
            ControlFrame::ConnectionEstablished { client_id } => {
                debug!(client_id = ?client_id, "backend greeted connection");
            }
            ControlFrame::Ping | ControlFrame::Pong => {}
        }
    }

    /// Handles frames until the connection closes or the run ends.
    ///
    /// Returns the number of transport items handled.
    pub async fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.next_event().await {
            handled += 1;
            if matches!(event, SessionEvent::Disconnected { .. }) || self.state.is_terminal() {
                break;
            }
        }
        handled
    }

    pub async fn pause(&mut self) -> Result<()> {
        self.lifecycle(LifecycleAction::Pause).await
    }

    pub async fn resume(&mut self) -> Result<()> {
        self.lifecycle(LifecycleAction::Resume).await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.lifecycle(LifecycleAction::Stop).await
    }

    /// Approves the pending plan, optionally with a note.
    pub async fn approve(&mut self, note: Option<&str>) -> Result<()> {
        self.feedback(FeedbackDecision::Approve {
            note: note.map(ToString::to_string),
        })
        .await
    }

    /// Sends modification feedback. Empty text is rejected before anything
    /// is recorded or sent; other text always lands in the transcript, even
    /// when the command cannot go out yet.
    pub async fn submit_feedback(&mut self, text: &str) -> Result<()> {
        self.feedback(FeedbackDecision::Modify {
            feedback: text.to_string(),
        })
        .await
    }

    async fn lifecycle(&mut self, action: LifecycleAction) -> Result<()> {
        let command = self.state.authorize(action)?;
        self.connection()?.ensure_subscribed(&command)?;
        self.state.commit(action, Utc::now());
        self.audit(action.as_str(), "");
        self.notify();
        self.send(&command).await
    }

    async fn feedback(&mut self, decision: FeedbackDecision) -> Result<()> {
        let command = self.state.authorize_feedback(&decision)?;
        self.state.record_feedback(&command, Utc::now())?;
        if let Err(err) = self
            .connection()
            .and_then(|connection| connection.ensure_subscribed(&command))
        {
            warn!(case_id = %self.case_id, error = %err, "feedback recorded but not sent");
            self.notify();
            return Err(err);
        }
        self.state.resolve_feedback(&decision)?;
        if let Command::Feedback { feedback, .. } = &command {
            self.audit(decision.label(), feedback);
        }
        self.notify();
        self.send(&command).await
    }

    /// Starts a new run through the REST collaborator.
    ///
    /// A finished run is discarded first; the new run starts from a fresh
    /// projection.
    pub async fn start_analysis(&mut self, api: &dyn CaseApi) -> Result<StartedAnalysis> {
        let started = api.start_analysis(&self.case_id).await?;
        if self.state.is_terminal() {
            debug!(case_id = %self.case_id, "previous run ended, starting from a fresh state");
            self.state = self.fresh.clone();
            if self.connection.as_ref().is_some_and(|c| !c.is_closed()) {
                self.state.connection_established(Utc::now());
            }
        }
        info!(case_id = %self.case_id, analysis_id = %started.analysis_id, "analysis started");
        self.state.start_requested(Utc::now());
        self.audit("start", &started.analysis_id);
        self.notify();
        Ok(started)
    }

    /// Tears down the connection. The projection stays readable.
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
            info!(case_id = %self.case_id, "case connection closed");
        }
    }

    fn connection(&self) -> Result<&CaseConnection> {
        self.connection
            .as_ref()
            .filter(|c| !c.is_closed())
            .ok_or_else(|| Error::Disconnected {
                reason: "no open connection for this case".to_string(),
            })
    }

    async fn send(&mut self, command: &Command) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::Disconnected {
                reason: "no open connection for this case".to_string(),
            });
        };
        connection.send(command).await
    }

    fn audit(&self, decision: &str, details: &str) {
        if let Some(audit) = &self.audit
            && let Err(err) = audit.log_decision(&self.case_id, decision, details)
        {
            warn!(error = %err, path = %audit.path().display(), "failed to write decision log");
        }
    }

    #[cfg(feature = "recording")]
    fn record(&mut self, text: &str) {
        if let Some(recorder) = self.recorder.as_mut()
            && let Err(err) = recorder.record(text)
        {
            warn!(error = %err, "frame recording failed, recorder disabled");
            self.recorder = None;
        }
    }

    #[cfg(not(feature = "recording"))]
    fn record(&mut self, _text: &str) {}

    fn notify(&self) {
        if self.observers.is_empty() && self.status.is_none() {
            return;
        }
        let snapshot = self.state.snapshot();
        for observer in &self.observers {
            observer(&snapshot);
        }
        if let Some(status) = &self.status
            && let Err(err) = status.update(&self.case_id, &snapshot)
        {
            warn!(error = %err, "failed to write status artifacts");
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.state.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| !c.is_closed())
    }

    pub fn is_subscribed(&self) -> bool {
        self.connection.as_ref().is_some_and(CaseConnection::is_subscribed)
    }

    pub fn malformed_frames(&self) -> usize {
        self.malformed_frames
    }
}
