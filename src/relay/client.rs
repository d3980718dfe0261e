//! Live relay connection for push delivery between agents.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{RelayFrame, RelayMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Callback invoked for every message pushed by the relay.
pub type MessageHandler = Arc<dyn Fn(RelayMessage) + Send + Sync>;

/// Lifecycle of a relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Shared {
    agent: String,
    state: watch::Sender<ConnectionState>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    connect_lock: tokio::sync::Mutex<()>,
    endpoint: Mutex<Option<String>>,
    handler: Mutex<Option<MessageHandler>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    dropped_frames: AtomicU64,
}

/// One WebSocket connection to a relay, owned by a single agent.
///
/// Outgoing messages are written straight to the socket; nothing is queued
/// while disconnected or still connecting. There is no automatic reconnect:
/// call [`RelayClient::connect`] again after the connection drops.
pub struct RelayClient {
    shared: Arc<Shared>,
}

impl RelayClient {
    pub fn new(agent: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                agent: agent.into(),
                state,
                sink: tokio::sync::Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                endpoint: Mutex::new(None),
                handler: Mutex::new(None),
                reader: Mutex::new(None),
                generation: AtomicU64::new(0),
                dropped_frames: AtomicU64::new(0),
            }),
        }
    }

    pub fn agent(&self) -> &str {
        &self.shared.agent
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of inbound frames discarded because they did not parse.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    /// Register the callback for pushed messages, replacing any previous one.
    ///
    /// Callbacks run on the connection's reader task, in arrival order.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(RelayMessage) + Send + Sync + 'static,
    {
        *lock(&self.shared.handler) = Some(Arc::new(handler));
    }

    /// Open a connection to `endpoint` (a `ws://` URL).
    ///
    /// Resolves once the WebSocket handshake completes. Any existing
    /// connection is closed first, and concurrent calls run one after the
    /// other, so the last one to finish owns the only connection. No timeout
    /// is applied; dropping the returned future abandons the attempt and
    /// leaves the client disconnected.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        // Held for the whole attempt, including the handshake.
        let _connecting = self.shared.connect_lock.lock().await;

        self.close().await;

        self.shared.state.send_replace(ConnectionState::Connecting);
        let attempt = ConnectAttempt {
            shared: &self.shared,
            finished: false,
        };

        debug!("Connecting {} to relay {}", self.shared.agent, endpoint);
        let (stream, _response) = connect_async(endpoint).await.map_err(|source| {
            warn!("Relay connection to {} failed: {}", endpoint, source);
            Error::Connection {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;
        let (sink, reader) = stream.split();

        // Publish the writer before flipping to connected so send never
        // sees Connected without a sink.
        *self.shared.sink.lock().await = Some(sink);
        *lock(&self.shared.endpoint) = Some(endpoint.to_string());
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.shared.state.send_replace(ConnectionState::Connected);
        attempt.finish();

        let task = tokio::spawn(read_loop(Arc::clone(&self.shared), reader, generation));
        let previous = lock(&self.shared.reader).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }

        info!("{} connected to relay {}", self.shared.agent, endpoint);
        Ok(())
    }

    /// Push a message to `to` over the open connection.
    ///
    /// Fire-and-forget: the relay sends no acknowledgement. Fails with
    /// [`Error::NotConnected`] unless a connection is open, and with
    /// [`Error::InvalidAgentName`] for an empty recipient.
    pub async fn send(&self, to: &str, message: &str) -> Result<()> {
        if to.is_empty() {
            return Err(Error::InvalidAgentName(to.to_string()));
        }

        let frame = RelayFrame::Message(RelayMessage::create(
            self.shared.agent.as_str(),
            to,
            message,
            Utc::now(),
        ));
        let json = frame.encode()?;

        let mut sink = self.shared.sink.lock().await;
        let ws = match sink.as_mut() {
            Some(ws) if self.is_connected() => ws,
            _ => return Err(self.not_connected()),
        };

        if let Err(source) = ws.send(Message::Text(json)).await {
            // A failed write means the socket is gone; retire this
            // connection so its reader does not report it a second time.
            sink.take();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            self.shared.state.send_replace(ConnectionState::Disconnected);
            let endpoint = lock(&self.shared.endpoint).clone().unwrap_or_default();
            warn!("Relay write to {} failed: {}", endpoint, source);
            return Err(Error::Connection { endpoint, source });
        }

        debug!("Pushed message from {} to {}", self.shared.agent, to);
        Ok(())
    }

    /// Close the connection, if any. Safe to call when already disconnected.
    pub async fn close(&self) {
        // Stop the reader first so it cannot race us into Disconnected.
        let reader = lock(&self.shared.reader).take();
        if let Some(task) = reader {
            task.abort();
        }
        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        let sink = self.shared.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Error closing relay connection: {}", e);
            }
            info!("{} disconnected from relay", self.shared.agent);
        }

        self.shared.state.send_replace(ConnectionState::Disconnected);
    }

    /// Wait until the client is disconnected.
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == ConnectionState::Disconnected).await;
    }

    fn not_connected(&self) -> Error {
        Error::NotConnected {
            agent: self.shared.agent.clone(),
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.shared.reader).take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("agent", &self.shared.agent)
            .field("state", &self.state())
            .finish()
    }
}

/// Resets the client to disconnected if a connect attempt is dropped or fails.
struct ConnectAttempt<'a> {
    shared: &'a Shared,
    finished: bool,
}

impl ConnectAttempt<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

async fn read_loop(shared: Arc<Shared>, mut reader: WsReader, generation: u64) {
    while let Some(msg) = reader.next().await {
        match msg {
            Ok(Message::Text(text)) => shared.dispatch(&text),
            Ok(Message::Close(frame)) => {
                debug!("Relay closed connection: {:?}", frame);
                break;
            }
            Ok(Message::Binary(_)) => {
                shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding binary relay frame");
            }
            // Pings are answered by the transport.
            Ok(_) => {}
            Err(e) => {
                warn!("Relay connection error: {}", e);
                break;
            }
        }
    }

    // Only the current connection may tear down shared state; a newer
    // connect or an explicit close has already bumped the generation.
    if shared.generation.load(Ordering::SeqCst) == generation {
        shared.sink.lock().await.take();
        shared.state.send_replace(ConnectionState::Disconnected);
        info!("{} lost relay connection", shared.agent);
    }
}

impl Shared {
    fn dispatch(&self, text: &str) {
        match RelayFrame::decode(text) {
            Ok(RelayFrame::Message(msg)) => {
                let handler = lock(&self.handler).clone();
                match handler {
                    Some(handler) => handler(msg),
                    None => info!("[{}]: {}", msg.from, msg.message),
                }
            }
            Ok(RelayFrame::Unknown) => debug!("Ignoring relay frame of unknown type"),
            Err(e) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                debug!("Discarding unparsable relay frame: {}", e);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
