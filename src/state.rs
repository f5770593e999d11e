//! Projected state for one discovery pipeline execution
//!
//! The authoritative copies of runs, documents and facts live on the
//! backend. What lives here is the client's read-projection: the state a
//! host renders from, kept converged with the backend by the event stream.

use serde::{Deserialize, Serialize};

/// Status of a processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

/// Per-document pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Discovered,
    Chunking,
    Embedding,
    Stored,
    Error,
}

/// Review status of an extracted fact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Confirmed,
    Rejected,
}

/// Completion summary attached to a run when the pipeline finishes.
///
/// Decoded from the server's `discovery:completed` payload; field names
/// are the server's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionSummary {
    pub total_documents: u32,
    pub facts_extracted: u32,
    pub average_confidence: f64,
    pub elapsed_ms: u64,
}

/// Per-stage counters for a run, maintained by the projector on genuine
/// status transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
    pub discovered: u32,
    pub chunked: u32,
    pub embedded: u32,
    pub stored: u32,
    pub facts_extracted: u32,
}

/// One execution of the multi-stage discovery pipeline.
///
/// Created on `discovery:started`, mutated by every subsequent event for
/// the run, terminal on `discovery:completed` or `discovery:error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingRun {
    pub id: String,
    pub case_id: String,
    pub status: RunStatus,
    pub total_files: u32,
    /// Documents that have reached the `stored` stage.
    pub processed_count: u32,
    pub stages: StageCounters,
    pub errors: Vec<String>,
    pub summary: Option<CompletionSummary>,
}

/// One file found during a run. Never deleted by the client; its
/// lifecycle ends with the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDocument {
    pub id: String,
    pub run_id: String,
    pub name: String,
    pub size: u64,
    pub status: DocumentStatus,
}

/// A derived factual claim extracted from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub category: String,
    pub confidence: f64,
    pub review_status: ReviewStatus,
}

/// The full projected view: at most one current run, every document
/// observed so far (documents of superseded runs keep their `run_id`),
/// and the facts extracted so far.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryState {
    pub run: Option<ProcessingRun>,
    pub documents: Vec<DiscoveredDocument>,
    pub facts: Vec<ExtractedFact>,
    /// Most recent pipeline error message, if any.
    pub last_error: Option<String>,
}

impl DiscoveryState {
    /// The id of the run currently being projected.
    pub fn processing_id(&self) -> Option<&str> {
        self.run.as_ref().map(|r| r.id.as_str())
    }

    pub fn document(&self, id: &str) -> Option<&DiscoveredDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn document_mut(&mut self, id: &str) -> Option<&mut DiscoveredDocument> {
        self.documents.iter_mut().find(|d| d.id == id)
    }

    pub fn fact(&self, id: &str) -> Option<&ExtractedFact> {
        self.facts.iter().find(|f| f.id == id)
    }

    pub fn fact_mut(&mut self, id: &str) -> Option<&mut ExtractedFact> {
        self.facts.iter_mut().find(|f| f.id == id)
    }
}
