//! UDP/WebSocket relay
//!
//! Two UDP feedback listeners broadcast everything they receive, verbatim,
//! to all connected WebSocket surface clients. Every frame a surface client
//! sends is forwarded, verbatim, to the two fixed UDP device destinations.
//! The bridge never interprets traffic; the codec is used for log lines only.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use oscdeck_core::decode;

use crate::config::BridgeConfig;
use crate::error::Result;

/// Connected surface clients and their outbound queues.
///
/// Each client drains its own queue in its own task, so one slow client
/// cannot hold up the others.
#[derive(Default)]
struct ClientSet {
    clients: RwLock<HashMap<u64, mpsc::UnboundedSender<Vec<u8>>>>,
    next_id: AtomicU64,
}

impl ClientSet {
    fn add(&self) -> (u64, mpsc::UnboundedReceiver<Vec<u8>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    fn remove(&self, id: u64) {
        self.clients.write().remove(&id);
    }

    fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Queue `bytes` for every connected client
    fn broadcast(&self, bytes: &[u8]) {
        let clients = self.clients.read();
        if clients.is_empty() {
            trace!("no surface clients, dropping broadcast");
            return;
        }
        debug!("fan-out to {} surface client(s)", clients.len());
        for (id, tx) in clients.iter() {
            if tx.send(bytes.to_vec()).is_err() {
                // The client task cleans itself up on disconnect
                trace!("client {} queue already closed", id);
            }
        }
    }
}

/// Human-readable form of a relayed datagram, for log lines only
fn describe(bytes: &[u8]) -> String {
    match decode(bytes) {
        Ok(msg) => match msg.arg {
            Some(arg) => format!("{} {:?}", msg.address, arg),
            None => msg.address,
        },
        Err(_) => format!("<{} undecodable bytes>", bytes.len()),
    }
}

/// The relay half of the bridge
pub struct RelayServer {
    config: BridgeConfig,
}

impl RelayServer {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Bind every socket the relay needs.
    ///
    /// Binding is separate from running so callers can read back the actual
    /// addresses when the configured ports are 0.
    pub async fn bind(self) -> Result<BoundRelay> {
        let feedback = bind_udp(&self.config.feedback_addr(), "feedback").await?;
        let script_feedback =
            bind_udp(&self.config.script_feedback_addr(), "script feedback").await?;
        let outbound = bind_udp("0.0.0.0:0", "outbound").await?;

        let ws_addr = self.config.ws_addr();
        let ws_listener = match TcpListener::bind(&ws_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("failed to bind WebSocket server on {}: {}", ws_addr, e);
                return Err(e.into());
            }
        };
        info!("WebSocket server listening on {}", ws_listener.local_addr()?);

        Ok(BoundRelay {
            config: self.config,
            clients: Arc::new(ClientSet::default()),
            feedback,
            script_feedback,
            outbound: Arc::new(outbound),
            ws_listener,
        })
    }
}

async fn bind_udp(addr: &str, label: &'static str) -> Result<UdpSocket> {
    match UdpSocket::bind(addr).await {
        Ok(socket) => {
            info!("{} socket bound on {}", label, socket.local_addr()?);
            Ok(socket)
        }
        Err(e) => {
            error!("failed to bind {} socket on {}: {}", label, addr, e);
            Err(e.into())
        }
    }
}

/// A relay with all sockets bound, ready to run
pub struct BoundRelay {
    config: BridgeConfig,
    clients: Arc<ClientSet>,
    feedback: UdpSocket,
    script_feedback: UdpSocket,
    outbound: Arc<UdpSocket>,
    ws_listener: TcpListener,
}

/// Shared state of the WebSocket handlers
#[derive(Clone)]
struct RelayState {
    clients: Arc<ClientSet>,
    outbound: Arc<UdpSocket>,
    control_destination: Arc<str>,
    script_destination: Arc<str>,
}

impl BoundRelay {
    pub fn feedback_addr(&self) -> Result<SocketAddr> {
        Ok(self.feedback.local_addr()?)
    }

    pub fn script_feedback_addr(&self) -> Result<SocketAddr> {
        Ok(self.script_feedback.local_addr()?)
    }

    pub fn ws_addr(&self) -> Result<SocketAddr> {
        Ok(self.ws_listener.local_addr()?)
    }

    /// Run the relay until the WebSocket server stops
    pub async fn run(self) -> Result<()> {
        let feedback_task = tokio::spawn(listen_udp(
            self.feedback,
            "feedback",
            self.clients.clone(),
        ));
        let script_task = tokio::spawn(listen_udp(
            self.script_feedback,
            "script feedback",
            self.clients.clone(),
        ));

        let state = RelayState {
            clients: self.clients,
            outbound: self.outbound,
            control_destination: self.config.control_destination.into(),
            script_destination: self.config.script_destination.into(),
        };
        let app = Router::new().route("/", get(ws_handler)).with_state(state);

        let result = axum::serve(self.ws_listener, app.into_make_service()).await;
        feedback_task.abort();
        script_task.abort();
        Ok(result?)
    }

    /// Spawn the relay in a background task
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Receive datagrams forever and broadcast each one verbatim
async fn listen_udp(socket: UdpSocket, label: &'static str, clients: Arc<ClientSet>) {
    let mut buf = vec![0u8; 65536];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, source)) => {
                let bytes = &buf[..len];
                debug!(
                    "{} <- {} ({} bytes from {})",
                    label,
                    describe(bytes),
                    len,
                    source
                );
                clients.broadcast(bytes);
            }
            Err(e) => {
                error!("{} socket receive error: {}", label, e);
                // Do not let a broken socket spin the loop
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(|socket| handle_client(socket, state))
}

/// Serve one surface client until it disconnects
async fn handle_client(socket: WebSocket, state: RelayState) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut queue) = state.clients.add();
    info!(
        "surface client {} connected ({} online)",
        id,
        state.clients.len()
    );

    let writer = tokio::spawn(async move {
        while let Some(bytes) = queue.recv().await {
            if sink.send(Message::Binary(bytes)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Binary(data)) => forward_to_device(&state, &data).await,
            Ok(Message::Text(text)) => forward_to_device(&state, text.as_bytes()).await,
            Ok(Message::Close(_)) => {
                debug!("surface client {} sent close", id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("surface client {} read error: {}", id, e);
                break;
            }
        }
    }

    state.clients.remove(id);
    writer.abort();
    info!(
        "surface client {} disconnected ({} online)",
        id,
        state.clients.len()
    );
}

/// Forward one client frame to both device destinations.
///
/// The two sends run concurrently; one slow or failed destination never
/// delays delivery to the other.
async fn forward_to_device(state: &RelayState, bytes: &[u8]) {
    debug!(
        "surface -> device: {} ({} bytes)",
        describe(bytes),
        bytes.len()
    );
    let (control, script) = tokio::join!(
        state
            .outbound
            .send_to(bytes, state.control_destination.as_ref()),
        state
            .outbound
            .send_to(bytes, state.script_destination.as_ref()),
    );
    if let Err(e) = control {
        warn!("send to {} failed: {}", state.control_destination, e);
    }
    if let Err(e) = script {
        warn!("send to {} failed: {}", state.script_destination, e);
    }
}
