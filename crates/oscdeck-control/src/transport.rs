//! Surface transport: the WebSocket client side of the relay bridge
//!
//! Owns the duplex connection, reconnects after unexpected drops, decodes
//! inbound frames, and applies relevant feedback to the state cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use oscdeck_core::{decode, encode, CachedValue, OscArg, StateCache};

/// Address predicate applied to decoded feedback before it touches the cache
pub type RelevanceFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Outbound OSC seam between the engine and the wire
pub trait OscSender: Send + Sync {
    /// Fire-and-forget send; failures are logged, never raised
    fn send(&self, address: &str, arg: OscArg);
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Bridge WebSocket URL
    pub url: String,
    /// Delay before a reconnect attempt after an unexpected drop
    pub reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765".to_string(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Error,
}

/// WebSocket client with automatic reconnect
pub struct SurfaceTransport {
    inner: Arc<TransportInner>,
}

struct TransportInner {
    config: TransportConfig,
    cache: Arc<StateCache>,
    relevance: RelevanceFilter,
    state: RwLock<ConnectionState>,
    manually_closed: AtomicBool,
    reconnect_pending: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    connection: Mutex<Option<JoinHandle<()>>>,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
}

impl SurfaceTransport {
    /// Create the transport and immediately begin connecting.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect(
        config: TransportConfig,
        cache: Arc<StateCache>,
        relevance: RelevanceFilter,
    ) -> Self {
        let inner = Arc::new(TransportInner {
            config,
            cache,
            relevance,
            state: RwLock::new(ConnectionState::Disconnected),
            manually_closed: AtomicBool::new(false),
            reconnect_pending: AtomicBool::new(false),
            outbound: Mutex::new(None),
            connection: Mutex::new(None),
            reconnect_timer: Mutex::new(None),
        });
        spawn_connection(inner.clone());
        Self { inner }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Encode and queue one message; dropped with a log when not connected
    pub fn send(&self, address: &str, arg: &OscArg) {
        let bytes = match encode(address, arg) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("dropping outbound message: {}", e);
                return;
            }
        };
        let guard = self.inner.outbound.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(Message::binary(bytes)).is_err() {
                    warn!("outbound queue closed, dropping {}", address);
                } else {
                    debug!("sent {} {:?}", address, arg);
                }
            }
            None => debug!("not connected, dropping {}", address),
        }
    }

    /// Begin a fresh connection cycle after a manual shutdown
    pub fn resume(&self) {
        self.inner.manually_closed.store(false, Ordering::SeqCst);
        let active = self
            .inner
            .connection
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false);
        if active || self.inner.reconnect_pending.load(Ordering::SeqCst) {
            debug!("resume requested while a connection cycle is active");
            return;
        }
        spawn_connection(self.inner.clone());
    }

    /// Close the connection and suppress all future reconnect attempts
    pub fn shutdown(&self) {
        info!("transport shutdown requested");
        self.inner.manually_closed.store(true, Ordering::SeqCst);
        self.inner.set_state(ConnectionState::Closing);
        if let Some(timer) = self.inner.reconnect_timer.lock().take() {
            timer.abort();
        }
        self.inner.reconnect_pending.store(false, Ordering::SeqCst);
        if let Some(tx) = self.inner.outbound.lock().take() {
            let _ = tx.send(Message::Close(None));
        }
        if let Some(connection) = self.inner.connection.lock().take() {
            connection.abort();
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for SurfaceTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl OscSender for SurfaceTransport {
    fn send(&self, address: &str, arg: OscArg) {
        SurfaceTransport::send(self, address, &arg);
    }
}

impl TransportInner {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn handle_frame(&self, bytes: &[u8]) {
        match decode(bytes) {
            Ok(msg) => {
                if !(self.relevance)(&msg.address) {
                    trace!("ignoring irrelevant feedback on {}", msg.address);
                    return;
                }
                match msg.arg {
                    Some(arg) => {
                        debug!("feedback {} = {:?}", msg.address, arg);
                        self.cache.update(&msg.address, CachedValue::from(arg));
                    }
                    None => trace!("feedback on {} carries no usable value", msg.address),
                }
            }
            Err(e) => warn!("dropping inbound frame: {}", e),
        }
    }
}

fn spawn_connection(inner: Arc<TransportInner>) {
    let mut slot = inner.connection.lock();
    if let Some(handle) = slot.as_ref() {
        if !handle.is_finished() {
            debug!("connection task already running");
            return;
        }
    }
    let task_inner = inner.clone();
    *slot = Some(tokio::spawn(async move {
        run_connection(task_inner).await;
    }));
}

async fn run_connection(inner: Arc<TransportInner>) {
    inner.set_state(ConnectionState::Connecting);
    info!("connecting to {}", inner.config.url);

    match tokio_tungstenite::connect_async(inner.config.url.as_str()).await {
        Ok((socket, _)) => {
            inner.reconnect_pending.store(false, Ordering::SeqCst);
            inner.set_state(ConnectionState::Connected);
            info!("connected to {}", inner.config.url);

            let (mut write, mut read) = socket.split();
            let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
            *inner.outbound.lock() = Some(tx);

            let writer = tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    let closing = matches!(msg, Message::Close(_));
                    if write.send(msg).await.is_err() || closing {
                        break;
                    }
                }
            });

            let mut errored = false;
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Binary(data)) => inner.handle_frame(&data),
                    Ok(Message::Text(text)) => {
                        debug!("ignoring text frame ({} bytes)", text.len());
                    }
                    Ok(Message::Close(_)) => {
                        debug!("connection closed by the bridge");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket read error: {}", e);
                        errored = true;
                        break;
                    }
                }
            }

            inner.outbound.lock().take();
            writer.abort();
            inner.set_state(if errored {
                ConnectionState::Error
            } else {
                ConnectionState::Closing
            });
        }
        Err(e) => {
            warn!("connection to {} failed: {}", inner.config.url, e);
            inner.set_state(ConnectionState::Error);
        }
    }

    if inner.manually_closed.load(Ordering::SeqCst) {
        inner.set_state(ConnectionState::Disconnected);
    } else {
        schedule_reconnect(&inner);
    }
}

fn schedule_reconnect(inner: &Arc<TransportInner>) {
    if inner.manually_closed.load(Ordering::SeqCst) {
        return;
    }
    // At most one pending reconnect; re-entrant scheduling is a no-op
    if inner.reconnect_pending.swap(true, Ordering::SeqCst) {
        debug!("reconnect already pending");
        return;
    }
    inner.set_state(ConnectionState::Disconnected);
    let delay = inner.config.reconnect_delay;
    info!("reconnecting to {} in {:?}", inner.config.url, delay);

    let timer_inner = inner.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        timer_inner.reconnect_pending.store(false, Ordering::SeqCst);
        if timer_inner.manually_closed.load(Ordering::SeqCst) {
            return;
        }
        spawn_connection(timer_inner.clone());
    });
    *inner.reconnect_timer.lock() = Some(timer);
}
