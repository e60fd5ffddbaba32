//! WebSocket Transport
//!
//! One logical connection to the game stream that never gives up:
//!
//! ```text
//!   connect ──ok──▶ open ──(frames, PING every 2s)──▶ closed / error
//!      ▲              │                                   │
//!      │          reset backoff                   schedule retry
//!      └──────────── sleep(min(1s·2^n, 30s) + jitter) ◀───┘
//! ```
//!
//! Frames are forwarded raw over an unbounded channel in arrival order;
//! decoding happens in the session. Outbound text is only accepted while
//! the socket is open. Nothing is buffered across reconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

use crate::network::backoff::{Backoff, ReconnectPolicy};
use crate::network::protocol::{is_pong, ClientCommand};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Stream endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Liveness probe period.
    pub ping_interval: Duration,
    /// Give up on a single connect attempt after this long.
    pub connect_timeout: Duration,
    /// Retry schedule.
    pub reconnect: ReconnectPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/game".to_string(),
            ping_interval: Duration::from_millis(2_000),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Connection-level errors. Never surfaced to consumers; they only decide
/// when the next retry happens.
#[derive(Debug, Error)]
pub enum TransportError {
    /// URL is not a websocket URL.
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),

    /// Handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Handshake or I/O failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// What the transport reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Socket opened.
    Connected,
    /// One raw text frame.
    Frame(String),
    /// PING → PONG round trip.
    Latency(Duration),
    /// Socket closed or connect failed; retrying after `retry_in`.
    Disconnected {
        /// Failed attempts since the last successful open.
        attempt: u32,
        /// Delay before the next attempt.
        retry_in: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketExit {
    Shutdown,
    Closed,
}

/// Handle to the reconnecting connection task.
pub struct GameConnection {
    outgoing: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl GameConnection {
    /// Start connecting in the background.
    pub fn connect(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let open = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_transport(
            config,
            events_tx,
            outgoing_rx,
            open.clone(),
            shutdown_rx,
        ));

        let connection = Self {
            outgoing: outgoing_tx,
            open,
            shutdown_tx,
            task: Some(task),
        };
        (connection, events_rx)
    }

    /// Send a protocol command. Returns false (and drops it) when closed.
    pub fn send(&self, command: &ClientCommand) -> bool {
        self.send_text(command.encode())
    }

    /// Send raw text. Returns false (and drops it) when closed.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.outgoing.send(text.into()).is_ok()
    }

    /// Whether the socket is currently open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the socket without reconnecting and wait for the task to end.
    /// Cancels the liveness probe and any pending retry.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for GameConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[instrument(skip_all, fields(url = %config.url))]
async fn run_transport(
    config: TransportConfig,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    mut outgoing_rx: mpsc::UnboundedReceiver<String>,
    open: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut backoff = Backoff::new(config.reconnect);
    let mut rng = StdRng::from_entropy();

    loop {
        let attempt = tokio::select! {
            result = open_socket(&config) => result,
            _ = shutdown_rx.recv() => break,
        };

        match attempt {
            Ok(socket) => {
                info!("Connected to game stream");
                backoff.reset();
                // Anything queued while closed is stale
                while outgoing_rx.try_recv().is_ok() {}
                open.store(true, Ordering::Release);

                if events_tx.send(TransportEvent::Connected).is_err() {
                    break;
                }

                let exit = run_socket(
                    socket,
                    config.ping_interval,
                    &events_tx,
                    &mut outgoing_rx,
                    &mut shutdown_rx,
                )
                .await;
                open.store(false, Ordering::Release);

                if exit == SocketExit::Shutdown {
                    break;
                }
            }
            Err(e) => {
                warn!("Connect failed: {}", e);
            }
        }

        let retry_in = backoff.next_delay(&mut rng);
        info!(
            "Disconnected, retrying in {}ms (attempt {})",
            retry_in.as_millis(),
            backoff.attempt()
        );
        let event = TransportEvent::Disconnected {
            attempt: backoff.attempt(),
            retry_in,
        };
        if events_tx.send(event).is_err() {
            break;
        }

        tokio::select! {
            _ = sleep(retry_in) => {}
            _ = shutdown_rx.recv() => break,
        }
    }

    open.store(false, Ordering::Release);
    debug!("Transport stopped");
}

async fn open_socket(config: &TransportConfig) -> Result<Socket, TransportError> {
    if !(config.url.starts_with("ws://") || config.url.starts_with("wss://")) {
        return Err(TransportError::InvalidUrl(config.url.clone()));
    }

    match timeout(config.connect_timeout, connect_async(config.url.as_str())).await {
        Ok(result) => {
            let (socket, _response) = result?;
            Ok(socket)
        }
        Err(_) => Err(TransportError::Timeout(config.connect_timeout)),
    }
}

async fn run_socket(
    socket: Socket,
    ping_interval: Duration,
    events_tx: &mpsc::UnboundedSender<TransportEvent>,
    outgoing_rx: &mut mpsc::UnboundedReceiver<String>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> SocketExit {
    let (mut sink, mut stream) = socket.split();

    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ping_sent: Option<Instant> = None;

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if is_pong(&text) {
                            if let Some(sent) = ping_sent.take() {
                                let _ = events_tx.send(TransportEvent::Latency(sent.elapsed()));
                            }
                        }
                        if events_tx.send(TransportEvent::Frame(text)).is_err() {
                            return SocketExit::Shutdown;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Server closed connection: {:?}", frame);
                        return SocketExit::Closed;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {}", e);
                        return SocketExit::Closed;
                    }
                    None => return SocketExit::Closed,
                    // Binary and control frames carry nothing for us
                    Some(Ok(_)) => {}
                }
            }
            Some(text) = outgoing_rx.recv() => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("Failed to send frame: {}", e);
                    return SocketExit::Closed;
                }
            }
            _ = ping.tick() => {
                let ping_frame = ClientCommand::Ping.encode().to_string();
                if sink.send(Message::Text(ping_frame)).await.is_err() {
                    return SocketExit::Closed;
                }
                ping_sent = Some(Instant::now());
            }
            _ = shutdown_rx.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return SocketExit::Shutdown;
            }
        }
    }
}
