//! Typed event contracts for the discovery event channel
//!
//! Ten fixed inbound event names, two room announcements, and two
//! correlated commands. Inbound payloads use the server's field naming
//! (camelCase) and are decoded permissively: unknown fields are ignored,
//! missing optional fields default to empty/zero.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SyncError;
use crate::state::CompletionSummary;

// Inbound event names (exact wire strings)
pub const DISCOVERY_STARTED: &str = "discovery:started";
pub const DISCOVERY_DOCUMENT_FOUND: &str = "discovery:document_found";
pub const DISCOVERY_CHUNKING: &str = "discovery:chunking";
pub const DISCOVERY_EMBEDDING: &str = "discovery:embedding";
pub const DISCOVERY_STORED: &str = "discovery:stored";
pub const DISCOVERY_FACT_EXTRACTED: &str = "discovery:fact_extracted";
pub const DISCOVERY_COMPLETED: &str = "discovery:completed";
pub const DISCOVERY_ERROR: &str = "discovery:error";
pub const FACT_UPDATED: &str = "fact:updated";
pub const FACT_DELETED: &str = "fact:deleted";

/// The full fixed set of inbound events. The registered listener set on
/// the transport is always either empty or exactly this set.
pub const INBOUND_EVENTS: [&str; 10] = [
    DISCOVERY_STARTED,
    DISCOVERY_DOCUMENT_FOUND,
    DISCOVERY_CHUNKING,
    DISCOVERY_EMBEDDING,
    DISCOVERY_STORED,
    DISCOVERY_FACT_EXTRACTED,
    DISCOVERY_COMPLETED,
    DISCOVERY_ERROR,
    FACT_UPDATED,
    FACT_DELETED,
];

// Outbound announcements
pub const SUBSCRIBE_CASE: &str = "subscribe_case";
pub const UNSUBSCRIBE_CASE: &str = "unsubscribe_case";

// Outbound correlated commands
pub const FACT_UPDATE: &str = "fact:update";
pub const FACT_DELETE: &str = "fact:delete";

/// `discovery:started` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartedPayload {
    pub processing_id: String,
    pub case_id: String,
    pub total_files: u32,
}

/// `discovery:document_found` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentFoundPayload {
    pub document_id: String,
    pub processing_id: String,
    pub name: String,
    pub size: u64,
}

/// Shared payload for the per-document stage events
/// (`discovery:chunking` / `discovery:embedding` / `discovery:stored`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageProgressPayload {
    pub document_id: String,
}

/// `discovery:fact_extracted` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FactExtractedPayload {
    pub fact_id: String,
    pub document_id: String,
    pub content: String,
    pub category: String,
    pub confidence: f64,
}

/// `discovery:completed` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletedPayload {
    pub processing_id: String,
    pub summary: CompletionSummary,
}

/// `discovery:error` payload. The `stage` field is informational only:
/// every pipeline error is treated as run-fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorPayload {
    pub error: String,
    pub stage: Option<String>,
}

/// `fact:updated` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FactUpdatedPayload {
    pub fact_id: String,
    pub content: String,
}

/// `fact:deleted` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FactDeletedPayload {
    pub fact_id: String,
}

/// A decoded inbound event, one variant per wire name.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Started(StartedPayload),
    DocumentFound(DocumentFoundPayload),
    Chunking(StageProgressPayload),
    Embedding(StageProgressPayload),
    Stored(StageProgressPayload),
    FactExtracted(FactExtractedPayload),
    Completed(CompletedPayload),
    Error(ErrorPayload),
    FactUpdated(FactUpdatedPayload),
    FactDeleted(FactDeletedPayload),
}

impl DiscoveryEvent {
    /// Decode an inbound event by wire name.
    ///
    /// A `null` payload is treated as an empty object so that events with
    /// no body still decode to all-default payloads.
    pub fn decode(event: &str, payload: JsonValue) -> Result<Self, SyncError> {
        let payload = if payload.is_null() {
            JsonValue::Object(serde_json::Map::new())
        } else {
            payload
        };

        match event {
            DISCOVERY_STARTED => Ok(Self::Started(parse(event, payload)?)),
            DISCOVERY_DOCUMENT_FOUND => Ok(Self::DocumentFound(parse(event, payload)?)),
            DISCOVERY_CHUNKING => Ok(Self::Chunking(parse(event, payload)?)),
            DISCOVERY_EMBEDDING => Ok(Self::Embedding(parse(event, payload)?)),
            DISCOVERY_STORED => Ok(Self::Stored(parse(event, payload)?)),
            DISCOVERY_FACT_EXTRACTED => Ok(Self::FactExtracted(parse(event, payload)?)),
            DISCOVERY_COMPLETED => Ok(Self::Completed(parse(event, payload)?)),
            DISCOVERY_ERROR => Ok(Self::Error(parse(event, payload)?)),
            FACT_UPDATED => Ok(Self::FactUpdated(parse(event, payload)?)),
            FACT_DELETED => Ok(Self::FactDeleted(parse(event, payload)?)),
            other => Err(SyncError::Decode {
                event: other.to_string(),
                reason: "unknown event name".to_string(),
            }),
        }
    }

    /// The wire name this event arrived under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started(_) => DISCOVERY_STARTED,
            Self::DocumentFound(_) => DISCOVERY_DOCUMENT_FOUND,
            Self::Chunking(_) => DISCOVERY_CHUNKING,
            Self::Embedding(_) => DISCOVERY_EMBEDDING,
            Self::Stored(_) => DISCOVERY_STORED,
            Self::FactExtracted(_) => DISCOVERY_FACT_EXTRACTED,
            Self::Completed(_) => DISCOVERY_COMPLETED,
            Self::Error(_) => DISCOVERY_ERROR,
            Self::FactUpdated(_) => FACT_UPDATED,
            Self::FactDeleted(_) => FACT_DELETED,
        }
    }
}

fn parse<T: DeserializeOwned>(event: &str, payload: JsonValue) -> Result<T, SyncError> {
    serde_json::from_value(payload).map_err(|e| SyncError::Decode {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

/// Room announcement body for `subscribe_case` / `unsubscribe_case`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRoom {
    pub case_id: String,
}

/// `fact:update` command body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactUpdateRequest {
    pub case_id: String,
    pub fact_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `fact:delete` command body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactDeleteRequest {
    pub case_id: String,
    pub fact_id: String,
}

/// Acknowledgment shape shared by both commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandAck {
    pub success: bool,
    pub error: Option<String>,
}
