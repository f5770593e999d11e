//! WebSocket transport with reconnect supervision
//!
//! Speaks JSON text frames to the event gateway:
//!
//! ```text
//! outbound event:   { "event": <name>, "payload": <object> }
//! outbound command: { "event": <name>, "payload": <object>, "ack": <u64> }
//! inbound event:    { "event": <name>, "payload": <object> }
//! inbound ack:      { "ack": <u64>, "payload": { "success": bool, "error"?: string } }
//! ```
//!
//! A supervisor task owns the connection: it reconnects with a fixed delay
//! (configurable cap on attempts), keeps the link alive with periodic
//! pings, and publishes the connected flag over a watch channel. Commands
//! are correlated by a locally generated id; pending acks are rejected
//! when the connection drops. The transport itself carries no subscription
//! knowledge - re-announcing rooms after a reconnect is the sync client's
//! job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::{rejected_ack, AckReceiver, EventTransport, InboundFrame};
use crate::error::SyncError;

type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<JsonValue, SyncError>>>>>;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// Event gateway WebSocket URL
    pub url: String,
    /// Delay between reconnection attempts
    pub reconnect_delay: Duration,
    /// Maximum reconnection attempts before giving up (0 = unlimited)
    pub max_reconnect_attempts: u32,
    /// Keepalive ping interval
    pub ping_interval: Duration,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4500/events".to_string(),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 0, // Unlimited
            ping_interval: Duration::from_secs(30),
        }
    }
}

impl WsTransportConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("CASEFILE_SYNC_URL")
                .unwrap_or_else(|_| "ws://localhost:4500/events".to_string()),
            reconnect_delay: Duration::from_secs(
                std::env::var("CASEFILE_SYNC_RECONNECT_DELAY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            max_reconnect_attempts: std::env::var("CASEFILE_SYNC_MAX_RECONNECT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// One JSON frame on the wire, in either direction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct WireFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<String>,
    #[serde(skip_serializing_if = "JsonValue::is_null")]
    payload: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    ack: Option<u64>,
}

/// WebSocket [`EventTransport`] implementation.
pub struct WsTransport {
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    outbound_tx: mpsc::UnboundedSender<String>,
    handlers: Arc<DashMap<String, mpsc::UnboundedSender<InboundFrame>>>,
    next_ack_id: AtomicU64,
    pending_acks: PendingAcks,
    shutdown_tx: broadcast::Sender<()>,
}

impl WsTransport {
    /// Start the transport. Returns immediately; the supervisor task
    /// connects in the background and the connected flag reports progress.
    pub fn spawn(config: WsTransportConfig) -> Arc<Self> {
        let (connected_tx, connected_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        let transport = Arc::new(Self {
            connected_tx,
            connected_rx,
            outbound_tx,
            handlers: Arc::new(DashMap::new()),
            next_ack_id: AtomicU64::new(1),
            pending_acks: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx,
        });

        let supervisor = Arc::clone(&transport);
        tokio::spawn(async move {
            supervisor.supervise(config, outbound_rx).await;
        });

        transport
    }

    /// Signal the supervisor to close the connection and stop.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Connect/reconnect loop.
    async fn supervise(&self, config: WsTransportConfig, mut outbound_rx: mpsc::UnboundedReceiver<String>) {
        let mut attempts = 0u32;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            info!(url = %config.url, "Connecting to event gateway");

            match connect_async(&config.url).await {
                Ok((ws, _)) => {
                    attempts = 0;
                    let _ = self.connected_tx.send(true);
                    info!(url = %config.url, "Event gateway connected");

                    let outcome = self.drive_connection(ws, &mut outbound_rx, &config).await;

                    let _ = self.connected_tx.send(false);
                    self.reject_pending();
                    // Frames queued while the link was going down are stale
                    while outbound_rx.try_recv().is_ok() {}

                    match outcome {
                        ConnectionEnd::Shutdown => break,
                        ConnectionEnd::Lost(reason) => {
                            warn!(reason = %reason, "Event gateway connection lost");
                        }
                    }
                }
                Err(e) => {
                    attempts += 1;
                    error!(error = %e, attempt = attempts, "Event gateway connect failed");

                    if config.max_reconnect_attempts > 0
                        && attempts >= config.max_reconnect_attempts
                    {
                        error!(
                            max = config.max_reconnect_attempts,
                            "Max reconnection attempts reached, stopping transport"
                        );
                        break;
                    }
                }
            }

            tokio::select! {
                _ = sleep(config.reconnect_delay) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("Event gateway transport stopped");
    }

    /// Pump one established connection until it ends.
    async fn drive_connection(
        &self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        outbound_rx: &mut mpsc::UnboundedReceiver<String>,
        config: &WsTransportConfig,
    ) -> ConnectionEnd {
        let (mut write, mut read) = ws.split();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ping = tokio::time::interval(config.ping_interval);
        // First tick fires immediately; skip it so pings start one interval in.
        ping.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    let _ = write.close().await;
                    return ConnectionEnd::Shutdown;
                }

                _ = ping.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        return ConnectionEnd::Lost(format!("Ping failed: {}", e));
                    }
                }

                frame = outbound_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                return ConnectionEnd::Lost(format!("Send failed: {}", e));
                            }
                        }
                        // All senders dropped: the transport handle is gone.
                        None => return ConnectionEnd::Shutdown,
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Binary(data))) => {
                            match std::str::from_utf8(&data) {
                                Ok(text) => self.handle_text(text),
                                Err(_) => debug!("Ignoring non-UTF8 binary frame"),
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("Received pong");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return ConnectionEnd::Lost(format!("Server closed connection: {:?}", frame));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return ConnectionEnd::Lost(format!("WebSocket error: {}", e));
                        }
                        None => {
                            return ConnectionEnd::Lost("WebSocket stream ended".to_string());
                        }
                    }
                }
            }
        }
    }

    /// Route one inbound text frame: named event or correlated ack.
    fn handle_text(&self, text: &str) {
        let frame: WireFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to decode inbound frame");
                return;
            }
        };

        if let Some(event) = frame.event {
            match self.handlers.get(&event) {
                Some(tx) => {
                    let _ = tx.send(InboundFrame {
                        event,
                        payload: frame.payload,
                    });
                }
                None => {
                    debug!(event = %event, "No listener registered, dropping event");
                }
            }
            return;
        }

        if let Some(id) = frame.ack {
            let sender = self
                .pending_acks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
            match sender {
                Some(tx) => {
                    let _ = tx.send(Ok(frame.payload));
                }
                None => {
                    debug!(ack = id, "Acknowledgment for unknown command, ignoring");
                }
            }
            return;
        }

        debug!("Inbound frame carried neither event nor ack, ignoring");
    }

    /// Reject every pending command; called when the connection drops.
    fn reject_pending(&self) {
        let drained: Vec<_> = self
            .pending_acks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain()
            .collect();

        for (id, tx) in drained {
            debug!(ack = id, "Rejecting pending command after disconnect");
            let _ = tx.send(Err(SyncError::AckChannelClosed));
        }
    }

    fn encode(event: &str, payload: JsonValue, ack: Option<u64>) -> Result<String, SyncError> {
        let frame = WireFrame {
            event: Some(event.to_string()),
            payload,
            ack,
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

impl EventTransport for WsTransport {
    fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    fn connection_watch(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }

    fn emit(&self, event: &str, payload: JsonValue) -> Result<(), SyncError> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let text = Self::encode(event, payload, None)?;
        self.outbound_tx
            .send(text)
            .map_err(|_| SyncError::Transport("Transport task stopped".to_string()))
    }

    fn emit_with_ack(&self, event: &str, payload: JsonValue) -> AckReceiver {
        if !self.is_connected() {
            return rejected_ack(SyncError::NotConnected);
        }

        let id = self.next_ack_id.fetch_add(1, Ordering::SeqCst);
        let text = match Self::encode(event, payload, Some(id)) {
            Ok(text) => text,
            Err(e) => return rejected_ack(e),
        };

        let (tx, rx) = oneshot::channel();
        self.pending_acks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, tx);

        if self.outbound_tx.send(text).is_err() {
            self.pending_acks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
            return rejected_ack(SyncError::Transport("Transport task stopped".to_string()));
        }

        rx
    }

    fn on(&self, event: &str, tx: mpsc::UnboundedSender<InboundFrame>) {
        self.handlers.insert(event.to_string(), tx);
    }

    fn off(&self, event: &str) {
        self.handlers.remove(event);
    }
}

enum ConnectionEnd {
    /// Shutdown was requested; do not reconnect.
    Shutdown,
    /// The connection failed or was closed by the server.
    Lost(String),
}
