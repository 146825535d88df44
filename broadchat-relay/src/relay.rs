//! Relay server core: shared state, WebSocket handler, connection registry,
//! and broadcast fan-out.
//!
//! The relay server accepts WebSocket connections, assigns each one a
//! `client-<n>` identity, and fans every chat message out to all other
//! registered clients. Join and leave events are announced to the remaining
//! clients together with the current registry size.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use broadchat_proto::codec;
use broadchat_proto::envelope::Envelope;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

/// Shared relay server state holding the connection registry and the
/// identity counter.
///
/// The registry maps client identity to a channel sender feeding that
/// client's WebSocket writer task. The counter is incremented exactly once
/// per accepted connection and never reused, so identities are unique for
/// the lifetime of the process.
#[derive(Default)]
pub struct RelayState {
    /// Maps client identity to a channel sender for delivering frames.
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    /// Monotonically increasing identity counter, seeded at 0.
    counter: AtomicU64,
}

impl RelayState {
    /// Creates a new relay state with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection, assigning it the next identity.
    ///
    /// Returns the assigned identity and the registry size after insertion
    /// (which therefore includes the new connection itself).
    pub async fn register(&self, sender: mpsc::UnboundedSender<Message>) -> (String, usize) {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let client_id = format!("client-{n}");
        let mut conns = self.connections.write().await;
        conns.insert(client_id.clone(), sender);
        let count = conns.len();
        drop(conns);
        (client_id, count)
    }

    /// Removes a client from the registry.
    ///
    /// Returns the registry size after removal if the client was present,
    /// or `None` if it had already been removed. Removal is idempotent so a
    /// duplicate close never double-announces a leave.
    pub async fn unregister(&self, client_id: &str) -> Option<usize> {
        let mut conns = self.connections.write().await;
        let removed = conns.remove(client_id);
        removed.map(|_| conns.len())
    }

    /// Returns the number of currently registered clients.
    pub async fn client_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Serializes an envelope once and delivers it to every registered
    /// connection except `exclude`.
    ///
    /// A connection observed mid-teardown has dropped its channel receiver;
    /// the failed send is silently skipped and never aborts the loop.
    pub async fn broadcast(&self, exclude: Option<&str>, envelope: &Envelope) {
        let frame = match codec::encode(envelope) {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode envelope for broadcast");
                return;
            }
        };

        let conns = self.connections.read().await;
        for (client_id, sender) in conns.iter() {
            if exclude == Some(client_id.as_str()) {
                continue;
            }
            let _ = sender.send(Message::Text(frame.clone()));
        }
    }

    /// Serializes an envelope and delivers it to a single client, if still
    /// registered. Fire-and-forget, like [`RelayState::broadcast`].
    pub async fn send_to(&self, client_id: &str, envelope: &Envelope) {
        let sender = {
            let conns = self.connections.read().await;
            conns.get(client_id).cloned()
        };
        if let Some(sender) = sender
            && let Ok(json) = codec::encode(envelope)
        {
            let _ = sender.send(Message::Text(json.into()));
        }
    }

    /// Send a WebSocket Close frame to all connected clients.
    ///
    /// Each client's writer task forwards the close frame, which triggers
    /// the client-side reader to detect disconnection. Used for graceful
    /// shutdown and testing.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (client_id, sender) in conns.iter() {
            tracing::info!(client_id = %client_id, "sending close frame to client");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Allocate the next identity and insert into the registry.
/// 2. Send the `system` welcome envelope to this client alone.
/// 3. Broadcast a `join` envelope to every other client.
/// 4. Enter the read loop, relaying each inbound payload.
/// 5. When the read stream ends, deregister and broadcast `leave`.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create a channel for sending frames to this client's WebSocket writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let (client_id, count) = state.register(tx).await;
    tracing::info!(client_id = %client_id, clients = count, "client connected");

    // The welcome goes directly on the socket before the writer task starts,
    // so it is always the first frame the client sees.
    let welcome = Envelope::welcome(&client_id, count);
    if let Err(e) = send_envelope(&mut ws_sender, &welcome).await {
        // Transport died during accept: registration is rolled back and
        // nothing is announced.
        tracing::warn!(client_id = %client_id, error = %e, "failed to send welcome");
        state.unregister(&client_id).await;
        return;
    }

    state
        .broadcast(Some(&client_id), &Envelope::join(&client_id, count))
        .await;

    // Spawn a writer task that forwards frames from the channel to the
    // WebSocket, so a slow client never stalls a broadcast to the others.
    let writer_client_id = client_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(client_id = %writer_client_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming payloads from this client.
    let reader_client_id = client_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    handle_payload(&reader_client_id, text.as_str(), &reader_state).await;
                }
                Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                    Ok(text) => handle_payload(&reader_client_id, text, &reader_state).await,
                    Err(_) => {
                        tracing::warn!(client_id = %reader_client_id, "non-UTF-8 binary payload");
                        reader_state
                            .send_to(&reader_client_id, &Envelope::invalid_format())
                            .await;
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::info!(client_id = %reader_client_id, "received close frame");
                    break;
                }
                Ok(_) => {
                    // Ignore ping and pong frames.
                }
                Err(e) => {
                    // A transport error alone does not deregister the client;
                    // the registry entry stays until the stream terminates.
                    tracing::warn!(client_id = %reader_client_id, error = %e, "WebSocket error");
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Deregistration is idempotent: only the first removal announces a leave.
    if let Some(remaining) = state.unregister(&client_id).await {
        tracing::info!(client_id = %client_id, clients = remaining, "client disconnected");
        state
            .broadcast(None, &Envelope::leave(&client_id, remaining))
            .await;
    }
}

/// Handles a raw inbound payload from a registered client.
///
/// A parseable payload is wrapped in a `message` envelope, echoed back to
/// the sender, and fanned out to everyone else. An unparseable payload is
/// dropped and answered with an `error` envelope to the sender only.
async fn handle_payload(client_id: &str, raw: &str, state: &Arc<RelayState>) {
    match codec::extract_text(raw) {
        Ok(text) => {
            tracing::debug!(client_id = %client_id, len = text.len(), "relaying message");
            let envelope = Envelope::chat(client_id, text);
            state.send_to(client_id, &envelope).await;
            state.broadcast(Some(client_id), &envelope).await;
        }
        Err(e) => {
            tracing::warn!(client_id = %client_id, error = %e, "dropping unparseable payload");
            state.send_to(client_id, &Envelope::invalid_format()).await;
        }
    }
}

/// Encodes and sends an envelope directly on a WebSocket sender.
async fn send_envelope(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    envelope: &Envelope,
) -> Result<(), String> {
    let json = codec::encode(envelope).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the relay server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address
/// and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
