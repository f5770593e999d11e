//! Error types for casefile-sync

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Command issued while the transport is disconnected. Surfaced
    /// synchronously, before anything reaches the wire.
    #[error("Not connected to the event channel")]
    NotConnected,

    /// Command issued without an active case subscription.
    #[error("No active case subscription")]
    NoActiveCase,

    /// The server acknowledged a command with `success: false`.
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// The acknowledgment channel closed before a response arrived,
    /// typically because the connection dropped while the command was
    /// in flight.
    #[error("Acknowledgment channel closed before a response arrived")]
    AckChannelClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode '{event}' payload: {reason}")]
    Decode { event: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
