use crate::transport::{Connector, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use lexwatch_proto::Command;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct BackendInner {
    /// Frames pushed while no connection was open.
    queued: VecDeque<TransportEvent>,
    current: Option<mpsc::UnboundedSender<TransportEvent>>,
    sent: Vec<String>,
    connections: usize,
    refuse: bool,
    auto_ack: bool,
}

impl BackendInner {
    fn deliver(&mut self, event: TransportEvent) {
        match &self.current {
            Some(tx) => {
                if let Err(mpsc::error::SendError(event)) = tx.send(event) {
                    self.current = None;
                    self.queued.push_back(event);
                }
            }
            None => self.queued.push_back(event),
        }
    }
}

/// Scriptable stand-in for the backend's websocket.
///
/// Cloning shares the same backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<BackendInner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every `subscribe_case` with `subscribed_to_case`.
    #[must_use]
    pub fn with_auto_ack(self) -> Self {
        self.lock().auto_ack = true;
        self
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            backend: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BackendInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers a raw frame to the open connection, or queues it for the next.
    pub fn push(&self, frame: impl Into<String>) {
        self.lock().deliver(TransportEvent::Frame(frame.into()));
    }

    pub fn push_json(&self, frame: &serde_json::Value) {
        self.push(frame.to_string());
    }

    pub fn acknowledge(&self, case_id: &str) {
        self.push_json(&serde_json::json!({"type": "subscribed_to_case", "case_id": case_id}));
    }

    /// Drops the open connection abnormally.
    pub fn disconnect(&self, reason: &str) {
        let mut inner = self.lock();
        if let Some(tx) = inner.current.take() {
            let _ = tx.send(TransportEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Sent frames that decode as commands, in send order.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.lock()
            .sent
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.lock().connections
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    backend: MemoryBackend,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, case_id: &str) -> Result<Box<dyn Transport>, TransportError> {
        let mut inner = self.backend.lock();
        if inner.refuse {
            return Err(TransportError::Connect {
                url: format!("memory://{case_id}"),
                reason: "connection refused".to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        for event in inner.queued.drain(..) {
            let _ = tx.send(event);
        }
        inner.current = Some(tx);
        inner.connections += 1;
        Ok(Box::new(MemoryTransport {
            backend: self.backend.clone(),
            rx,
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    backend: MemoryBackend,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    closed: bool,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut inner = self.backend.lock();
        if inner.auto_ack
            && let Ok(Command::Subscribe { case_id }) = serde_json::from_str(&text)
        {
            let ack = serde_json::json!({"type": "subscribed_to_case", "case_id": case_id});
            inner.deliver(TransportEvent::Frame(ack.to_string()));
        }
        inner.sent.push(text);
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        if self.closed {
            return TransportEvent::Disconnected {
                reason: "connection is closed".to_string(),
            };
        }
        let event = self.rx.recv().await.unwrap_or(TransportEvent::Disconnected {
            reason: "backend went away".to_string(),
        });
        if matches!(event, TransportEvent::Disconnected { .. }) {
            self.closed = true;
        }
        event
    }

    async fn close(&mut self) {
        self.closed = true;
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_frames_flush_on_open() {
        let backend = MemoryBackend::new();
        backend.push(r#"{"type":"ping"}"#);

        let mut transport = backend.connector().open("case-1").await.unwrap();
        assert_eq!(
            transport.next_event().await,
            TransportEvent::Frame(r#"{"type":"ping"}"#.into())
        );
    }

    #[tokio::test]
    async fn test_auto_ack_answers_subscribe() {
        let backend = MemoryBackend::new().with_auto_ack();
        let mut transport = backend.connector().open("case-1").await.unwrap();
        transport
            .send_text(r#"{"type":"subscribe_case","case_id":"case-1"}"#.into())
            .await
            .unwrap();

        let TransportEvent::Frame(ack) = transport.next_event().await else {
            panic!("expected ack frame");
        };
        assert!(ack.contains("subscribed_to_case"));
        assert_eq!(backend.sent_commands(), vec![Command::subscribe("case-1")]);
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let backend = MemoryBackend::new();
        let mut transport = backend.connector().open("case-1").await.unwrap();
        backend.disconnect("reset by peer");

        assert_eq!(
            transport.next_event().await,
            TransportEvent::Disconnected {
                reason: "reset by peer".into()
            }
        );
        assert!(transport.send_text("{}".into()).await.is_err());
    }
}
