use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
    time::Duration,
};
use strum::Display;
use thiserror::Error;
use tokio::{
    select,
    sync::{mpsc, oneshot, Notify},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use ludex_core::connector::RemotePeer;
use ludex_core::error::TransportError;
use ludex_proto::{
    Attachment, ChangeBatch, CheckpointToken, CollectionId, DocumentId, DocumentState, PeerMessage, PeerRequest,
    PeerRequestBody, PeerResponseBody, Presence, RequestId, Revision, StoreId,
};

/// Connection state for the websocket client
#[derive(Debug, Clone, PartialEq, Display)]
pub enum ConnectionState {
    Disconnected,
    #[strum(serialize = "Connecting")]
    Connecting {
        url: String,
    },
    #[strum(serialize = "Connected")]
    Connected {
        url: String,
        server_presence: Presence,
    },
    #[strum(serialize = "Error")]
    Error(ConnectionError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("General connection error: {0}")]
    General(String),
}

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Inner {
    presence: Presence,
    server_url: String,
    connection_state: RwLock<ConnectionState>,
    state_changed: Notify,
    server_presence: RwLock<Option<Presence>>,
    connected: AtomicBool,
    sender: Mutex<Option<mpsc::UnboundedSender<PeerMessage>>>,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<PeerResponseBody>>>,
    shutdown: Notify,
    shutdown_requested: AtomicBool,
}

/// A WebSocket client of the remote document authority.
///
/// Maintains one connection with automatic reconnection backoff and
/// correlates requests with responses by request id, so it can serve as a
/// [`RemotePeer`] for the replication engine.
pub struct WebsocketClient {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebsocketClient {
    /// Create a new client and start connecting to the server.
    pub async fn new(store_id: StoreId, collection: CollectionId, server_url: &str) -> anyhow::Result<Self> {
        let ws_url = Self::normalize_url(server_url)?;
        info!("Creating WebSocket client for {}", ws_url);

        let inner = Arc::new(Inner {
            presence: Presence { store_id, collection },
            server_url: ws_url,
            connection_state: RwLock::new(ConnectionState::Disconnected),
            state_changed: Notify::new(),
            server_presence: RwLock::new(None),
            connected: AtomicBool::new(false),
            sender: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
            shutdown_requested: AtomicBool::new(false),
        });

        let task = tokio::spawn(Self::run_connection_loop(inner.clone()));
        Ok(Self { inner, task: Mutex::new(Some(task)) })
    }

    pub(crate) fn normalize_url(url: &str) -> anyhow::Result<String> {
        let ws_url = match url {
            u if u.starts_with("ws://") || u.starts_with("wss://") => format!("{}/ws", u),
            u if u.starts_with("http://") => format!("ws://{}/ws", &u[7..]),
            u if u.starts_with("https://") => format!("wss://{}/ws", &u[8..]),
            u => format!("wss://{}/ws", u),
        };
        url::Url::parse(&ws_url)?;
        Ok(ws_url)
    }

    pub fn state(&self) -> ConnectionState { self.inner.connection_state.read().unwrap().clone() }

    pub fn is_connected(&self) -> bool { self.inner.connected.load(Ordering::Acquire) }

    /// Wait until the presence handshake completes (or the connection errors).
    pub async fn wait_connected(&self) -> Result<(), ConnectionError> {
        loop {
            let notified = self.inner.state_changed.notified();
            match &*self.inner.connection_state.read().unwrap() {
                ConnectionState::Connected { .. } => return Ok(()),
                ConnectionState::Error(e) => return Err(e.clone()),
                _ => {}
            }
            notified.await;
        }
    }

    /// Gracefully shut down the connection.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        info!("Shutting down WebSocket client");

        if let Some(task) = self.task.lock().unwrap().take() {
            self.inner.shutdown_requested.store(true, Ordering::Release);
            self.inner.shutdown.notify_waiters();

            match task.await {
                Ok(()) => info!("WebSocket client shutdown completed"),
                Err(e) => warn!("Connection task join error during shutdown: {}", e),
            }
        } else {
            info!("WebSocket client already shut down");
        }
        Ok(())
    }

    fn set_state(inner: &Arc<Inner>, state: ConnectionState) {
        *inner.connection_state.write().unwrap() = state;
        inner.state_changed.notify_waiters();
    }

    /// Main connection loop with automatic reconnection
    async fn run_connection_loop(inner: Arc<Inner>) {
        let mut backoff = INITIAL_BACKOFF;
        info!("Starting websocket connection loop to {}", inner.server_url);

        loop {
            select! {
                _ = inner.shutdown.notified() => {
                    info!("Websocket connection shutting down");
                    break;
                }
                result = Self::connect_once(&inner) => {
                    match result {
                        Ok(()) => {
                            info!("Connection to {} completed normally", inner.server_url);
                            backoff = INITIAL_BACKOFF;
                            if inner.shutdown_requested.load(Ordering::Acquire) {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Connection to {} failed: {}", inner.server_url, e);
                            Self::set_state(&inner, ConnectionState::Error(ConnectionError::General(e.to_string())));
                            inner.connected.store(false, Ordering::Release);

                            info!("Retrying connection in {:?}", backoff);
                            select! {
                                _ = inner.shutdown.notified() => break,
                                _ = sleep(backoff) => {}
                            }
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        }

        Self::disconnect(&inner);
        Self::set_state(&inner, ConnectionState::Disconnected);
    }

    /// Attempt a single connection
    async fn connect_once(inner: &Arc<Inner>) -> anyhow::Result<()> {
        debug!("Attempting to connect to {}", inner.server_url);
        Self::set_state(inner, ConnectionState::Connecting { url: inner.server_url.clone() });

        let (ws_stream, _) = connect_async(inner.server_url.as_str()).await?;
        debug!("WebSocket handshake completed with {}", inner.server_url);

        let (mut sink, mut stream) = ws_stream.split();

        // Announce ourselves immediately
        let presence = PeerMessage::Presence(inner.presence.clone());
        sink.send(Message::Binary(bincode::serialize(&presence)?.into())).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<PeerMessage>();
        *inner.sender.lock().unwrap() = Some(tx);

        let result = loop {
            select! {
                _ = inner.shutdown.notified() => {
                    debug!("Connection received shutdown signal");
                    break Ok(());
                }
                msg = rx.recv() => {
                    let Some(message) = msg else { break Ok(()) };
                    let data = match bincode::serialize(&message) {
                        Ok(data) => data,
                        Err(e) => {
                            error!("Failed to serialize outgoing message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Binary(data.into())).await {
                        break Err(e.into());
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => Self::handle_frame(inner, &data),
                        Some(Ok(Message::Close(_))) => {
                            info!("WebSocket connection closed by server");
                            break Ok(());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(_)) => {
                            debug!("Ignoring unexpected message type");
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            break Err(e.into());
                        }
                        None => {
                            info!("WebSocket stream closed");
                            break Ok(());
                        }
                    }
                }
            }
        };

        Self::disconnect(inner);
        result
    }

    fn handle_frame(inner: &Arc<Inner>, data: &[u8]) {
        match bincode::deserialize::<PeerMessage>(data) {
            Ok(PeerMessage::Presence(server_presence)) => {
                info!("Received server presence: {}", server_presence.store_id);
                *inner.server_presence.write().unwrap() = Some(server_presence.clone());
                inner.connected.store(true, Ordering::Release);
                Self::set_state(
                    inner,
                    ConnectionState::Connected { url: inner.server_url.clone(), server_presence },
                );
            }
            Ok(PeerMessage::Response(response)) => {
                let waiter = inner.pending.lock().unwrap().remove(&response.request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response.body);
                    }
                    None => warn!("Response for unknown request {}", response.request_id),
                }
            }
            Ok(PeerMessage::Request(request)) => {
                warn!("Server sent a request ({}); this client does not serve", request.id);
            }
            Err(e) => warn!("Failed to deserialize message: {}", e),
        }
    }

    /// Tear down per-connection state and fail all in-flight requests.
    fn disconnect(inner: &Arc<Inner>) {
        inner.connected.store(false, Ordering::Release);
        *inner.sender.lock().unwrap() = None;
        *inner.server_presence.write().unwrap() = None;
        inner.pending.lock().unwrap().clear();
    }

    async fn request(&self, body: PeerRequestBody) -> Result<PeerResponseBody, TransportError> {
        let sender = self.inner.sender.lock().unwrap().clone().ok_or(TransportError::ConnectionClosed)?;
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().unwrap().insert(id, tx);

        if sender.send(PeerMessage::Request(PeerRequest { id, body })).is_err() {
            self.inner.pending.lock().unwrap().remove(&id);
            return Err(TransportError::ConnectionClosed);
        }

        match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(PeerResponseBody::Error(e))) => Err(TransportError::Peer(e)),
            Ok(Ok(response)) => Ok(response),
            // Dropped on disconnect
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                self.inner.pending.lock().unwrap().remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }
}

fn unexpected(body: PeerResponseBody) -> TransportError { TransportError::Codec(format!("unexpected response: {}", body)) }

#[async_trait]
impl RemotePeer for WebsocketClient {
    async fn store_id(&self) -> Result<StoreId, TransportError> {
        self.inner.server_presence.read().unwrap().as_ref().map(|p| p.store_id).ok_or(TransportError::ConnectionClosed)
    }

    async fn changes_since(&self, since: CheckpointToken, limit: u32) -> Result<ChangeBatch, TransportError> {
        match self.request(PeerRequestBody::Changes { since, limit }).await? {
            PeerResponseBody::Changes(batch) => Ok(batch),
            other => Err(unexpected(other)),
        }
    }

    async fn bulk_get(&self, requests: Vec<(DocumentId, Revision)>) -> Result<Vec<DocumentState>, TransportError> {
        match self.request(PeerRequestBody::BulkGet { requests }).await? {
            PeerResponseBody::Documents(documents) => Ok(documents),
            other => Err(unexpected(other)),
        }
    }

    async fn bulk_put(&self, documents: Vec<DocumentState>) -> Result<(), TransportError> {
        match self.request(PeerRequestBody::BulkPut { documents }).await? {
            PeerResponseBody::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn get_attachment(&self, id: &DocumentId, name: &str) -> Result<Attachment, TransportError> {
        match self.request(PeerRequestBody::GetAttachment { id: id.clone(), name: name.to_string() }).await? {
            PeerResponseBody::Attachment(attachment) => Ok(attachment),
            other => Err(unexpected(other)),
        }
    }

    async fn put_attachment(&self, id: &DocumentId, name: &str, content_type: &str, payload: Bytes) -> Result<(), TransportError> {
        let body = PeerRequestBody::PutAttachment {
            id: id.clone(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            payload,
        };
        match self.request(body).await? {
            PeerResponseBody::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

impl Drop for WebsocketClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            debug!("WebSocket client dropped, requesting shutdown");
            self.inner.shutdown_requested.store(true, Ordering::Release);
            self.inner.shutdown.notify_waiters();
            task.abort();
        }
    }
}
