use super::{Connector, Transport, TransportError, TransportEvent};
use crate::config::BackendConfig;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to `{ws_url}/{client_id}`, the backend's per-client socket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            url: config.socket_url(&config.client_id()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, case_id: &str) -> Result<Box<dyn Transport>, TransportError> {
        debug!(url = %self.url, case_id, "opening websocket");
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(WebSocketTransport {
            socket,
            closed: false,
        }))
    }
}

pub struct WebSocketTransport {
    socket: Socket,
    closed: bool,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_event(&mut self) -> TransportEvent {
        if self.closed {
            return TransportEvent::Disconnected {
                reason: "connection is closed".to_string(),
            };
        }
        loop {
            let reason = match self.socket.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Frame(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return TransportEvent::Frame(text),
                    Err(_) => {
                        warn!("dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => frame.map_or_else(
                    || "server closed the connection".to_string(),
                    |f| format!("server closed the connection ({}): {}", u16::from(f.code), f.reason),
                ),
                Some(Ok(other)) => {
                    trace!(?other, "ignoring control message");
                    continue;
                }
                Some(Err(err)) => err.to_string(),
                None => "stream ended".to_string(),
            };
            self.closed = true;
            return TransportEvent::Disconnected { reason };
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.socket.close(None).await {
            debug!(error = %err, "websocket close failed");
        }
    }
}
