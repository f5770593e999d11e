//! Event channel transport
//!
//! The transport is a persistent, bidirectional, message-oriented
//! connection with named event emission, named event listening, and
//! connection-state notification. The sync client consumes it through the
//! [`EventTransport`] trait and is handed in explicitly - there is no
//! process-wide connection, which keeps multiple isolated instances
//! possible in tests.
//!
//! | Module   | Responsibility                                      |
//! |----------|-----------------------------------------------------|
//! | `ws`     | WebSocket implementation with reconnect supervision |
//! | `memory` | In-process implementation for tests and embedding   |

pub mod memory;
pub mod ws;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::SyncError;

/// One named event delivered by the transport, in delivery order.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub event: String,
    pub payload: JsonValue,
}

/// One-shot completion handle for a correlated command acknowledgment.
///
/// Resolves with the ack payload, or with an error if the connection
/// drops while the command is pending. Dropping the receiver abandons the
/// command; the transport discards the late ack.
pub type AckReceiver = oneshot::Receiver<Result<JsonValue, SyncError>>;

/// The transport primitives the sync client relies on.
pub trait EventTransport: Send + Sync + 'static {
    /// Current connection flag.
    fn is_connected(&self) -> bool;

    /// Watch channel reporting connected/disconnected transitions.
    fn connection_watch(&self) -> watch::Receiver<bool>;

    /// Fire-and-forget emission of a named event.
    fn emit(&self, event: &str, payload: JsonValue) -> Result<(), SyncError>;

    /// Emit a named event carrying an inline acknowledgment channel.
    /// Exactly one acknowledgment is expected per emission.
    fn emit_with_ack(&self, event: &str, payload: JsonValue) -> AckReceiver;

    /// Register the listener for a named event. Registering a name twice
    /// replaces the previous listener rather than duplicating dispatch.
    fn on(&self, event: &str, tx: mpsc::UnboundedSender<InboundFrame>);

    /// Remove the listener for a named event.
    fn off(&self, event: &str);
}

/// Resolve an ack receiver immediately with an error. Used by transports
/// when a correlated emission cannot even be queued.
pub(crate) fn rejected_ack(error: SyncError) -> AckReceiver {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(Err(error));
    rx
}
