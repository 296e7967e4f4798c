//! Transport adapter.
//!
//! A [`Connector`] opens one case-scoped [`Transport`]; [`CaseConnection`]
//! wraps it with the subscribe handshake. The adapter never retries on its
//! own: an abnormal close surfaces as [`TransportEvent::Disconnected`] and
//! the caller decides whether to reconnect.

mod websocket;

pub use websocket::{WebSocketConnector, WebSocketTransport};

use async_trait::async_trait;
use lexwatch_proto::{Command, Error};
use tracing::{debug, info, warn};

/// One item read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A raw text frame, not yet decoded.
    Frame(String),
    /// The connection closed; no further frames will arrive.
    Disconnected { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("failed to send frame: {0}")]
    Send(String),

    #[error("connection is closed")]
    Closed,
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Error::Disconnected {
                reason: "connection is closed".to_string(),
            },
            other => Error::Transport(other.to_string()),
        }
    }
}

/// A bidirectional, ordered frame channel for one case.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Waits for the next frame. Returns `Disconnected` forever once closed.
    async fn next_event(&mut self) -> TransportEvent;

    async fn close(&mut self);
}

/// Opens transports. Implemented by the websocket client and by the
/// in-memory backend used in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, case_id: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// A subscribed connection for one case view.
///
/// Owned by exactly one session; dropped or closed when the view goes away.
pub struct CaseConnection {
    case_id: String,
    transport: Box<dyn Transport>,
    subscribed: bool,
    closed: bool,
}

impl std::fmt::Debug for CaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseConnection")
            .field("case_id", &self.case_id)
            .field("subscribed", &self.subscribed)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl CaseConnection {
    /// Opens a transport and immediately sends `subscribe_case`.
    ///
    /// With `require_ack` set, other commands are refused until
    /// [`acknowledge`](Self::acknowledge) is called for this case.
    pub async fn connect(
        connector: &dyn Connector,
        case_id: &str,
        require_ack: bool,
    ) -> Result<Self, Error> {
        let mut transport = connector.open(case_id).await?;
        let subscribe = encode(&Command::subscribe(case_id))?;
        if let Err(err) = transport.send_text(subscribe).await {
            transport.close().await;
            return Err(err.into());
        }
        info!(case_id, "subscribe sent");
        Ok(Self {
            case_id: case_id.to_string(),
            transport,
            subscribed: !require_ack,
            closed: false,
        })
    }

    /// Marks the subscription acknowledged. Acks for other cases are ignored.
    pub fn acknowledge(&mut self, case_id: Option<&str>) -> bool {
        match case_id {
            Some(acked) if acked != self.case_id => {
                warn!(expected = %self.case_id, acked, "subscription ack for another case");
                false
            }
            _ => {
                if !self.subscribed {
                    debug!(case_id = %self.case_id, "subscription acknowledged");
                }
                self.subscribed = true;
                true
            }
        }
    }

    pub fn ensure_subscribed(&self, command: &Command) -> Result<(), Error> {
        if self.closed {
            return Err(TransportError::Closed.into());
        }
        if self.subscribed {
            Ok(())
        } else {
            Err(Error::NotSubscribed {
                command: command.name(),
            })
        }
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), Error> {
        self.ensure_subscribed(command)?;
        let text = encode(command)?;
        self.transport.send_text(text).await?;
        debug!(case_id = %self.case_id, command = command.name(), "command sent");
        Ok(())
    }

    pub async fn next_event(&mut self) -> TransportEvent {
        if self.closed {
            return TransportEvent::Disconnected {
                reason: "connection is closed".to_string(),
            };
        }
        let event = self.transport.next_event().await;
        if matches!(event, TransportEvent::Disconnected { .. }) {
            self.closed = true;
            self.subscribed = false;
        }
        event
    }

    pub async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.subscribed = false;
            self.transport.close().await;
            debug!(case_id = %self.case_id, "connection closed");
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn encode(command: &Command) -> Result<String, Error> {
    serde_json::to_string(command).map_err(|e| Error::Transport(e.to_string()))
}
