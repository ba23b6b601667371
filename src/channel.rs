//! Message channel – one WebSocket to the VTTL server plus its receive loop.
//!
//! ## Task model
//!
//! ```text
//! caller task                  │  receive task (one per connection)
//! ──────────────────────────── │ ───────────────────────────────────
//! VttlClient::move_entity(..)  │ listen()
//!   → channel.send(envelope)   │   stream.next()
//!   → sink.send(Text)          │   → ServerMessage::parse
//!                              │   → cache.replace(snapshot)
//!   channel.request(..)        │   → pending[request_id].send(msg)
//!   ← oneshot reply  ←─────────┼── → events.send(msg)
//! ```
//!
//! There is no outbound queue: each `send` writes exactly one text frame
//! from the calling task, serialised by a mutex around the sink.  When the
//! server closes the socket the receive loop marks the channel disconnected,
//! clears the cache and exits.  Nothing reconnects.

use crate::cache::GameStateCache;
use crate::error::{ClientError, Result};
use crate::protocol::{Command, Envelope, ServerMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>>;

/// How many decoded messages a slow subscriber may lag behind.
const EVENT_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Dispatch state shared with the receive task
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Dispatch {
    cache: GameStateCache,
    connected: Arc<AtomicBool>,
    pending: PendingMap,
    events: broadcast::Sender<ServerMessage>,
}

impl Dispatch {
    fn handle_text(&self, text: &str) {
        match ServerMessage::parse(text) {
            Ok(msg) => self.dispatch(msg),
            Err(e) => log::warn!("Dropping undecodable frame: {}", e),
        }
    }

    fn dispatch(&self, msg: ServerMessage) {
        // Cache first, so a caller woken by its ack already sees the snapshot.
        match &msg {
            ServerMessage::GameState { state, .. } => self.cache.replace(state.clone()),
            ServerMessage::Error { message, .. } => log::error!("Server error: {}", message),
            other => log::debug!("Received message: {}", other.kind()),
        }

        if let Some(id) = msg.request_id() {
            if let Some(waiter) = self.pending.lock().remove(&id) {
                let _ = waiter.send(msg.clone());
            }
        }

        // No subscribers is fine.
        let _ = self.events.send(msg);
    }

    fn shut_down(&self) {
        self.connected.store(false, Ordering::Release);
        self.cache.clear();
        // Dropping the senders wakes every waiter with a closed-channel error.
        self.pending.lock().clear();
    }
}

// ---------------------------------------------------------------------------
// MessageChannel
// ---------------------------------------------------------------------------

/// A live connection.  Construct with [`MessageChannel::connect`].
pub struct MessageChannel {
    url: String,
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    dispatch: Dispatch,
    next_request_id: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl MessageChannel {
    /// Open the socket and start the receive loop.
    ///
    /// Failure here is fatal to the caller; there is no retry.
    pub async fn connect(url: &str, cache: GameStateCache) -> Result<Self> {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            log::error!("Failed to connect to {}: {}", url, e);
            ClientError::Connection(format!("{url}: {e}"))
        })?;

        log::info!("Connected to VTTL server at {}", url);

        let (sink, stream) = ws.split();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let dispatch = Dispatch {
            cache,
            connected: Arc::new(AtomicBool::new(true)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            events,
        };

        let listener = tokio::spawn(listen(stream, dispatch.clone()));

        Ok(Self {
            url: url.to_string(),
            sink: tokio::sync::Mutex::new(sink),
            dispatch,
            next_request_id: AtomicU64::new(0),
            listener: Mutex::new(Some(listener)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.dispatch.connected.load(Ordering::Acquire)
    }

    pub fn cache(&self) -> &GameStateCache {
        &self.dispatch.cache
    }

    /// Every decoded inbound message, in arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.dispatch.events.subscribe()
    }

    /// Write one envelope as a single text frame.
    ///
    /// Fails fast with [`ClientError::NotConnected`] once the socket is gone.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let text = envelope.to_json()?;
        log::trace!("→ {}", text);
        self.sink.lock().await.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Fire-and-forget convenience around [`MessageChannel::send`].
    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.send(&Envelope::new(command)).await
    }

    /// Send `command` tagged with a fresh `request_id` and wait for the
    /// first inbound message echoing it.
    ///
    /// An echoed `error` becomes [`ClientError::Server`].
    pub async fn request(&self, command: Command, timeout: Duration) -> Result<ServerMessage> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let action = command.action();
        let (tx, rx) = oneshot::channel();
        self.dispatch.pending.lock().insert(id, tx);

        if let Err(e) = self.send(&Envelope::new(command).with_request_id(id)).await {
            self.dispatch.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(ServerMessage::Error { message, .. })) => Err(ClientError::Server(message)),
            Ok(Ok(reply)) => Ok(reply),
            // Sender dropped: the receive loop ended underneath us.
            Ok(Err(_)) => Err(ClientError::NotConnected),
            Err(_) => {
                self.dispatch.pending.lock().remove(&id);
                log::warn!("No reply to '{}' (request {}) after {:?}", action, id, timeout);
                Err(ClientError::Timeout {
                    action: action.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Close the socket and stop the receive loop.  Idempotent.
    pub async fn disconnect(&self) {
        if self.dispatch.connected.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.sink.lock().await.close().await {
                log::debug!("Error closing socket: {}", e);
            }
            log::info!("Disconnected from VTTL server");
        }

        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        self.dispatch.shut_down();
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

async fn listen(mut stream: SplitStream<WsStream>, dispatch: Dispatch) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch.handle_text(&text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch.handle_text(text),
                Err(_) => log::warn!("Dropping non-UTF-8 binary frame ({} bytes)", bytes.len()),
            },
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by tungstenite itself.
            Ok(_) => {}
            Err(e) => {
                log::warn!("Error listening for messages: {}", e);
                break;
            }
        }
    }

    log::info!("Server connection closed");
    dispatch.shut_down();
}
