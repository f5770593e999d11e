//! casefile-sync: real-time discovery pipeline synchronization
//!
//! Client-side synchronization for a legal document discovery pipeline.
//! The server walks each case's documents through discovery, chunking,
//! embedding, storage and fact extraction, and publishes progress over a
//! bidirectional event channel. This crate keeps a local projection of
//! that pipeline live: it subscribes to the case's room, folds every
//! inbound event into [`DiscoveryState`] through a pure reducer, and
//! carries correlated fact commands back to the server.
//!
//! ## Architecture
//!
//! | Module         | Responsibility                                        |
//! |----------------|-------------------------------------------------------|
//! | `transport`    | Event channel seam: WebSocket impl + in-memory twin   |
//! | `subscription` | Listener registration and case-room interest          |
//! | `router`       | Decode inbound frames, project, fire host callbacks   |
//! | `projector`    | Pure reducer and the state store behind it            |
//! | `state`        | Projected entities: run, documents, facts             |
//! | `events`       | Wire event names and payload types                    |
//! | `commands`     | Correlated `fact:update` / `fact:delete` commands     |
//! | `client`       | Mount/unmount lifecycle and reconnect supervision     |
//!
//! Events flow one way: transport listeners push frames onto a single
//! queue, one router task drains it in order, and state changes only
//! through the reducer. Commands never mutate local state on success;
//! the server's echoed event is the sole mutation path.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use casefile_sync::{MemoryStore, SyncClient, SyncOptions, WsTransport, WsTransportConfig};
//!
//! # async fn run() {
//! let transport = WsTransport::spawn(WsTransportConfig::from_env());
//! let store = Arc::new(MemoryStore::new());
//! let client = SyncClient::mount(
//!     transport,
//!     Arc::clone(&store) as Arc<dyn casefile_sync::StateStore>,
//!     SyncOptions::new()
//!         .with_case("case-123")
//!         .on_error(|message| eprintln!("pipeline error: {message}")),
//! );
//!
//! // ... later, after reviewing a fact:
//! client.update_fact("fact-9", "Corrected content", Some("typo")).await.ok();
//! client.unmount();
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod projector;
pub mod router;
pub mod state;
pub mod subscription;
pub mod transport;

pub use client::SyncClient;
pub use config::{Callbacks, SyncOptions};
pub use error::SyncError;
pub use events::DiscoveryEvent;
pub use projector::{reduce, MemoryStore, StateStore};
pub use state::{
    CompletionSummary, DiscoveredDocument, DiscoveryState, DocumentStatus, ExtractedFact,
    ProcessingRun, ReviewStatus, RunStatus, StageCounters,
};
pub use subscription::Interest;
pub use transport::memory::MemoryTransport;
pub use transport::ws::{WsTransport, WsTransportConfig};
pub use transport::{EventTransport, InboundFrame};
