//! WebSocket chat client for the `BroadChat` relay.
//!
//! Connects to a relay server, waits for the `system` welcome envelope to
//! learn its assigned identity, and then exposes a send/receive API over the
//! live connection. A background reader task forwards every received
//! envelope to the caller and keeps the active client count current.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use broadchat_proto::codec;
use broadchat_proto::envelope::{Envelope, EnvelopeKind};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the relay server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for waiting for the welcome envelope after connecting.
const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced by the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting or waiting for the welcome envelope timed out.
    #[error("connection timed out")]
    Timeout,
    /// The connection to the relay server is closed.
    #[error("connection closed")]
    ConnectionClosed,
    /// The message text was empty after trimming; nothing was sent.
    #[error("message text is empty")]
    EmptyMessage,
    /// The server sent something other than the expected welcome envelope.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Underlying WebSocket failure.
    #[error("websocket error: {0}")]
    WebSocket(String),
}

/// A live connection to a `BroadChat` relay server.
///
/// Created via [`ChatClient::connect`], which establishes the WebSocket
/// connection, adopts the server-assigned identity from the welcome
/// envelope, and spawns a background reader task.
pub struct ChatClient {
    /// Identity assigned by the server (`client-<n>`).
    client_id: String,
    /// The relay server URL (ws:// or wss://).
    url: String,
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Channel of envelopes received by the background reader task.
    incoming: Mutex<mpsc::Receiver<Envelope>>,
    /// Whether the WebSocket connection to the relay is active.
    connected: Arc<AtomicBool>,
    /// Last `clientsCount` observed in any received envelope.
    active_clients: Arc<AtomicUsize>,
    /// Handle to the background reader task (kept for the client's lifetime).
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl ChatClient {
    /// Connect to a relay server and wait to be assigned an identity.
    ///
    /// Performs the following steps:
    /// 1. Establishes a WebSocket connection to `url` (10s timeout)
    /// 2. Waits for the `system` welcome envelope (5s timeout) and adopts
    ///    the `clientId` it carries
    /// 3. Spawns a background task that reads incoming envelopes
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] if connection or welcome times out.
    /// - [`ClientError::ConnectionClosed`] if the server closes early.
    /// - [`ClientError::Protocol`] if the first envelope is not a welcome.
    /// - [`ClientError::WebSocket`] for transport-level failures.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url, "relay WebSocket connect timed out");
                ClientError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url, error = %e, "relay WebSocket connect failed");
                ClientError::WebSocket(e.to_string())
            })?;

        let (ws_sender, mut ws_reader) = ws_stream.split();

        let welcome = wait_for_welcome(&mut ws_reader).await?;
        let Some(client_id) = welcome.client_id.clone() else {
            return Err(ClientError::Protocol(
                "welcome envelope carried no clientId".to_string(),
            ));
        };
        tracing::info!(client_id = %client_id, url, "adopted identity from relay");

        let active_clients = Arc::new(AtomicUsize::new(welcome.clients_count.unwrap_or(0)));
        let connected = Arc::new(AtomicBool::new(true));

        let (tx, rx) = mpsc::channel(256);
        let reader_connected = Arc::clone(&connected);
        let reader_active = Arc::clone(&active_clients);
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_connected, reader_active));

        Ok(Self {
            client_id,
            url: url.to_string(),
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            connected,
            active_clients,
            _reader_handle: reader_handle,
        })
    }

    /// The identity assigned by the server (`client-<n>`).
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The relay server URL this client is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The most recently observed active client count.
    #[must_use]
    pub fn active_clients(&self) -> usize {
        self.active_clients.load(Ordering::Relaxed)
    }

    /// Whether the connection to the relay is still active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Local echo detection: whether an envelope refers to this client.
    #[must_use]
    pub fn is_mine(&self, envelope: &Envelope) -> bool {
        envelope.client_id.as_deref() == Some(self.client_id.as_str())
    }

    /// Send a chat message to the relay.
    ///
    /// The text is trimmed before sending; empty input is rejected locally
    /// without touching the wire. The payload is the JSON object
    /// `{"text": <trimmed>}`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::EmptyMessage`] if the trimmed text is empty.
    /// - [`ClientError::ConnectionClosed`] if the relay connection is down.
    pub async fn send_text(&self, text: &str) -> Result<(), ClientError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if !self.connected.load(Ordering::Relaxed) {
            return Err(ClientError::ConnectionClosed);
        }

        let payload = serde_json::json!({ "text": trimmed }).to_string();
        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "relay send failed");
                self.connected.store(false, Ordering::Relaxed);
                ClientError::ConnectionClosed
            })?;

        Ok(())
    }

    /// Receive the next envelope from the relay.
    ///
    /// Blocks until an envelope arrives from the background reader task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionClosed`] once the relay connection
    /// has been lost and all buffered envelopes were consumed.
    pub async fn recv(&self) -> Result<Envelope, ClientError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(ClientError::ConnectionClosed)
    }

    /// Close the connection to the relay.
    ///
    /// Best-effort: a close frame is sent if the transport still accepts it.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::Relaxed);
        let mut sender = self.ws_sender.lock().await;
        let _ = sender.send(Message::Close(None)).await;
    }
}

/// Waits for the first envelope on the WebSocket, expecting the `system`
/// welcome that carries the assigned identity.
async fn wait_for_welcome(ws_reader: &mut WsReader) -> Result<Envelope, ClientError> {
    let deadline = tokio::time::Instant::now() + WELCOME_TIMEOUT;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!("timed out waiting for welcome envelope");
                ClientError::Timeout
            })?;

        match frame {
            Some(Ok(Message::Text(text))) => {
                let envelope = codec::decode(text.as_str())
                    .map_err(|e| ClientError::Protocol(format!("malformed welcome: {e}")))?;
                if envelope.kind == EnvelopeKind::System {
                    return Ok(envelope);
                }
                return Err(ClientError::Protocol(format!(
                    "expected system welcome, got {:?}",
                    envelope.kind
                )));
            }
            Some(Ok(Message::Close(_))) => return Err(ClientError::ConnectionClosed),
            Some(Ok(_)) => {
                // Skip ping/pong/binary frames while waiting for the welcome.
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "WebSocket error while waiting for welcome");
                return Err(ClientError::WebSocket(e.to_string()));
            }
            None => return Err(ClientError::ConnectionClosed),
        }
    }
}

/// Background task that reads frames and forwards decoded envelopes.
///
/// Keeps `active_clients` current from any `clientsCount` field observed.
/// Malformed frames are logged and skipped; the task does not disconnect on
/// bad data. Sets `connected` to `false` when the WebSocket closes or
/// errors out.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<Envelope>,
    connected: Arc<AtomicBool>,
    active_clients: Arc<AtomicUsize>,
) {
    while let Some(frame) = ws_reader.next().await {
        match frame {
            Ok(Message::Text(text)) => match codec::decode(text.as_str()) {
                Ok(envelope) => {
                    if let Some(count) = envelope.clients_count {
                        active_clients.store(count, Ordering::Relaxed);
                    }
                    if tx.send(envelope).await.is_err() {
                        // Receiver dropped, so the client was dropped: exit.
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed envelope from relay, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("relay WebSocket closed by server");
                break;
            }
            Ok(_) => {
                // Ignore ping/pong/binary frames.
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("relay reader task exiting");
}
