//! In-process transport
//!
//! A memory-only twin of the WebSocket transport: same contract, no
//! socket. Tests drive it directly (inject events, flip the connection
//! flag, answer acks by hand) and hosts can use it to bridge events from
//! elsewhere in the same process.

use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::{rejected_ack, AckReceiver, EventTransport, InboundFrame};
use crate::error::SyncError;

/// A correlated emission waiting for a hand-written acknowledgment.
pub struct PendingAck {
    pub event: String,
    pub payload: JsonValue,
    responder: oneshot::Sender<Result<JsonValue, SyncError>>,
}

impl PendingAck {
    /// Answer the command with an arbitrary ack payload.
    pub fn respond(self, payload: JsonValue) {
        let _ = self.responder.send(Ok(payload));
    }

    /// Answer with `{ "success": true }`.
    pub fn respond_success(self) {
        self.respond(serde_json::json!({ "success": true }));
    }

    /// Answer with `{ "success": false, "error": <message> }`.
    pub fn respond_failure(self, message: &str) {
        self.respond(serde_json::json!({ "success": false, "error": message }));
    }
}

/// In-process [`EventTransport`] implementation.
pub struct MemoryTransport {
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    handlers: DashMap<String, mpsc::UnboundedSender<InboundFrame>>,
    emitted: Mutex<Vec<(String, JsonValue)>>,
    pending_acks: Mutex<VecDeque<PendingAck>>,
}

impl MemoryTransport {
    pub fn new(connected: bool) -> Self {
        let (connected_tx, connected_rx) = watch::channel(connected);
        Self {
            connected_tx,
            connected_rx,
            handlers: DashMap::new(),
            emitted: Mutex::new(Vec::new()),
            pending_acks: Mutex::new(VecDeque::new()),
        }
    }

    /// Flip the connection flag. Going down rejects every pending ack,
    /// the same way a dropped socket would.
    pub fn set_connected(&self, up: bool) {
        let _ = self.connected_tx.send(up);
        if !up {
            let drained: Vec<PendingAck> = self
                .pending_acks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .drain(..)
                .collect();
            for pending in drained {
                let _ = pending.responder.send(Err(SyncError::AckChannelClosed));
            }
        }
    }

    /// Deliver a named event to its registered listener, if any.
    /// Returns whether a listener consumed it.
    pub fn inject(&self, event: &str, payload: JsonValue) -> bool {
        match self.handlers.get(event) {
            Some(tx) => tx
                .send(InboundFrame {
                    event: event.to_string(),
                    payload,
                })
                .is_ok(),
            None => {
                debug!(event = %event, "No listener registered, dropping injected event");
                false
            }
        }
    }

    /// Every fire-and-forget emission so far, in order.
    pub fn emitted(&self) -> Vec<(String, JsonValue)> {
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Payloads of the emissions with the given event name.
    pub fn emitted_named(&self, event: &str) -> Vec<JsonValue> {
        self.emitted()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload)
            .collect()
    }

    /// Take the oldest unanswered correlated emission.
    pub fn take_pending_ack(&self) -> Option<PendingAck> {
        self.pending_acks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Number of event names with a registered listener.
    pub fn listener_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn has_listener(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }
}

impl EventTransport for MemoryTransport {
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
        self.emitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((event.to_string(), payload));
        Ok(())
    }

    fn emit_with_ack(&self, event: &str, payload: JsonValue) -> AckReceiver {
        if !self.is_connected() {
            return rejected_ack(SyncError::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        self.pending_acks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(PendingAck {
                event: event.to_string(),
                payload,
                responder: tx,
            });
        rx
    }

    fn on(&self, event: &str, tx: mpsc::UnboundedSender<InboundFrame>) {
        self.handlers.insert(event.to_string(), tx);
    }

    fn off(&self, event: &str) {
        self.handlers.remove(event);
    }
}
