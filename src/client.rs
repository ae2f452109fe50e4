//! WebSocket connection manager: lifecycle, send path, reconnect.
//!
//! Owns the [`Session`] value (relay-assigned identity, username, connection
//! state) and the transport. A writer task drains a bounded outgoing channel
//! so a send never blocks the edit path; a reader task turns inbound text
//! frames into [`ClientEvent`]s on an mpsc channel consumed by a single
//! event loop, which keeps all state mutation serialized.
//!
//! There is no implicit retry inside `connect`; recovery from transient
//! network loss goes through [`CollabClient::connect_with_retry`], a bounded
//! exponential-backoff loop. Each successful reconnect re-sends the join
//! handshake, and the relay answers with a fresh welcome carrying the
//! authoritative document — that is the resynchronization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ClientMessage, ProtocolError};

/// Transport lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// This participant's session identity.
///
/// `self_id` is assigned by the relay in the welcome message and stays
/// `None` until then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub self_id: Option<String>,
    pub username: String,
}

/// Events surfaced to the session event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Transport established and join sent; status indicators go green.
    Connected,
    /// One inbound frame (possibly several newline-joined messages).
    Frame(String),
    /// Transport lost or closed; presence must be cleared.
    Disconnected,
}

/// Bounded exponential backoff for reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based): base doubling,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay)
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay endpoint, e.g. `ws://127.0.0.1:8080/ws`.
    pub server_url: String,
    pub username: String,
    pub reconnect: ReconnectPolicy,
    /// Outgoing channel capacity; overflow is logged and dropped.
    pub outgoing_capacity: usize,
    /// Event channel capacity toward the session loop.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".to_string(),
            username: "anonymous".to_string(),
            reconnect: ReconnectPolicy::default(),
            outgoing_capacity: 256,
            event_capacity: 256,
        }
    }
}

/// The connection manager.
pub struct CollabClient {
    config: ClientConfig,
    session: Session,
    state: Arc<RwLock<ConnectionState>>,
    /// Set by an explicit disconnect; suppresses auto-reconnect.
    shutdown: Arc<AtomicBool>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_tx: mpsc::Sender<ClientEvent>,
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
}

impl CollabClient {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let session = Session { self_id: None, username: config.username.clone() };
        Self {
            config,
            session,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            shutdown: Arc::new(AtomicBool::new(false)),
            outgoing_tx: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    /// Connect to the relay and send the join handshake.
    ///
    /// Spawns the writer and reader tasks; returns once the transport is up.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        self.shutdown.store(false, Ordering::SeqCst);
        *self.state.write().unwrap() = ConnectionState::Connecting;

        match tokio_tungstenite::connect_async(self.config.server_url.as_str()).await {
            Ok((ws_stream, _)) => {
                let (mut ws_writer, mut ws_reader) = ws_stream.split();

                let (out_tx, mut out_rx) =
                    mpsc::channel::<String>(self.config.outgoing_capacity.max(1));
                self.outgoing_tx = Some(out_tx);

                // Writer task: drain the outgoing channel onto the socket.
                // When the channel closes (explicit disconnect) the peer gets
                // a close frame rather than a dangling connection.
                tokio::spawn(async move {
                    while let Some(line) = out_rx.recv().await {
                        if ws_writer.send(Message::Text(line.into())).await.is_err() {
                            break;
                        }
                    }
                    let _ = ws_writer.send(Message::Close(None)).await;
                });

                *self.state.write().unwrap() = ConnectionState::Connected;
                self.send(&ClientMessage::Join { username: self.session.username.clone() });
                let _ = self.event_tx.send(ClientEvent::Connected).await;
                log::info!("connected to {}", self.config.server_url);

                // Reader task: inbound frames become events, in arrival order.
                let event_tx = self.event_tx.clone();
                let state = self.state.clone();
                tokio::spawn(async move {
                    while let Some(msg) = ws_reader.next().await {
                        match msg {
                            Ok(Message::Text(frame)) => {
                                if event_tx
                                    .send(ClientEvent::Frame(frame.as_str().to_owned()))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Ok(Message::Close(_)) | Err(_) => break,
                            _ => {}
                        }
                    }
                    *state.write().unwrap() = ConnectionState::Disconnected;
                    let _ = event_tx.send(ClientEvent::Disconnected).await;
                });

                Ok(())
            }
            Err(e) => {
                *self.state.write().unwrap() = ConnectionState::Disconnected;
                log::warn!("connect to {} failed: {e}", self.config.server_url);
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    /// Bounded exponential-backoff connect loop.
    pub async fn connect_with_retry(&mut self) -> Result<(), ProtocolError> {
        let policy = self.config.reconnect.clone();
        for attempt in 0..policy.max_attempts {
            if self.connect().await.is_ok() {
                return Ok(());
            }
            if attempt + 1 == policy.max_attempts {
                break;
            }
            *self.state.write().unwrap() = ConnectionState::Reconnecting;
            let delay = policy.delay_for(attempt);
            log::warn!(
                "reconnect attempt {}/{} failed, next try in {delay:?}",
                attempt + 1,
                policy.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
        *self.state.write().unwrap() = ConnectionState::Disconnected;
        Err(ProtocolError::ConnectionClosed)
    }

    /// Queue a message for the writer task.
    ///
    /// When not connected the message is logged and dropped; no error is
    /// raised to the caller, and the edit path is never blocked.
    pub fn send(&self, msg: &ClientMessage) {
        if self.state() != ConnectionState::Connected {
            log::warn!("not connected, dropping outgoing message: {msg:?}");
            return;
        }
        let line = match msg.encode() {
            Ok(line) => line,
            Err(e) => {
                log::warn!("failed to encode outgoing message: {e}");
                return;
            }
        };
        match &self.outgoing_tx {
            Some(tx) => {
                if let Err(e) = tx.try_send(line) {
                    log::warn!("outgoing channel unavailable, dropping message: {e}");
                }
            }
            None => log::warn!("no transport, dropping outgoing message"),
        }
    }

    /// Explicitly close the connection. Suppresses auto-reconnect.
    pub fn disconnect(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the sender ends the writer task, which closes the socket.
        self.outgoing_tx = None;
        *self.state.write().unwrap() = ConnectionState::Disconnected;
        let _ = self.event_tx.try_send(ClientEvent::Disconnected);
        log::info!("disconnected from {}", self.config.server_url);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether the last disconnect was requested locally.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
