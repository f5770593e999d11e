//! State projection - deterministic mapping from events to state mutations
//!
//! `reduce` is a pure reducer: given identical prior state and event
//! payload, the resulting state is identical. It never touches the clock,
//! never allocates ids, and is applied through the store's single mutation
//! entry point - the client keeps no shadow copy of its own.
//!
//! Events referencing a document or fact the client does not know are a
//! benign race (the event beat the one that would have created the entity,
//! or arrived for a previous interest set). They are logged and ignored.

use std::sync::RwLock;

use tracing::debug;

use crate::events::DiscoveryEvent;
use crate::state::{
    DiscoveredDocument, DiscoveryState, DocumentStatus, ExtractedFact, ProcessingRun,
    ReviewStatus, RunStatus,
};

/// The external state container's single mutation entry point.
///
/// The host owns the state; the client only hands it mutations. Hosts
/// embedding the client in a larger application implement this over their
/// own store; [`MemoryStore`] is the default standalone container.
pub trait StateStore: Send + Sync + 'static {
    fn update(&self, mutate: &mut dyn FnMut(&mut DiscoveryState));
}

/// In-memory state container backed by an `RwLock`.
pub struct MemoryStore {
    state: RwLock<DiscoveryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DiscoveryState::default()),
        }
    }

    /// Clone the current state for rendering or assertions.
    pub fn snapshot(&self) -> DiscoveryState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn update(&self, mutate: &mut dyn FnMut(&mut DiscoveryState)) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        mutate(&mut state);
    }
}

/// Apply one decoded event to the projected state.
pub fn reduce(state: &mut DiscoveryState, event: &DiscoveryEvent) {
    match event {
        DiscoveryEvent::Started(p) => {
            state.run = Some(ProcessingRun {
                id: p.processing_id.clone(),
                case_id: p.case_id.clone(),
                status: RunStatus::Running,
                total_files: p.total_files,
                ..ProcessingRun::default()
            });
            // Documents and facts of a superseded run stay; the client
            // never removes documents, and facts only leave on
            // `fact:deleted`. Hosts filter by run id when rendering.
            state.last_error = None;
        }

        DiscoveryEvent::DocumentFound(p) => {
            let replacement = DiscoveredDocument {
                id: p.document_id.clone(),
                run_id: p.processing_id.clone(),
                name: p.name.clone(),
                size: p.size,
                status: DocumentStatus::Discovered,
            };
            match state.document_mut(&p.document_id) {
                Some(existing) => *existing = replacement,
                None => {
                    state.documents.push(replacement);
                    if let Some(run) = state.run.as_mut() {
                        run.stages.discovered += 1;
                    }
                }
            }
        }

        DiscoveryEvent::Chunking(p) => {
            advance_document(state, &p.document_id, DocumentStatus::Chunking);
        }
        DiscoveryEvent::Embedding(p) => {
            advance_document(state, &p.document_id, DocumentStatus::Embedding);
        }
        DiscoveryEvent::Stored(p) => {
            advance_document(state, &p.document_id, DocumentStatus::Stored);
        }

        DiscoveryEvent::FactExtracted(p) => {
            let fact = ExtractedFact {
                id: p.fact_id.clone(),
                document_id: p.document_id.clone(),
                content: p.content.clone(),
                category: p.category.clone(),
                confidence: p.confidence,
                review_status: ReviewStatus::Pending,
            };
            match state.fact_mut(&p.fact_id) {
                // Redelivered fact: converge instead of duplicating.
                Some(existing) => *existing = fact,
                None => {
                    state.facts.push(fact);
                    if let Some(run) = state.run.as_mut() {
                        run.stages.facts_extracted += 1;
                    }
                }
            }
        }

        DiscoveryEvent::Completed(p) => match state.run.as_mut() {
            Some(run) => {
                run.status = RunStatus::Completed;
                run.summary = Some(p.summary.clone());
            }
            None => {
                debug!(
                    processing_id = %p.processing_id,
                    "Completion event for unknown run, ignoring"
                );
            }
        },

        DiscoveryEvent::Error(p) => {
            // Every pipeline error is run-fatal; the stage field is
            // informational only and folded into the recorded entry.
            let entry = match &p.stage {
                Some(stage) => format!("{}: {}", stage, p.error),
                None => p.error.clone(),
            };
            if let Some(run) = state.run.as_mut() {
                run.errors.push(entry);
                run.status = RunStatus::Error;
            }
            state.last_error = Some(p.error.clone());
        }

        DiscoveryEvent::FactUpdated(p) => match state.fact_mut(&p.fact_id) {
            Some(fact) => fact.content = p.content.clone(),
            None => {
                debug!(fact_id = %p.fact_id, "Update for unknown fact, ignoring");
            }
        },

        DiscoveryEvent::FactDeleted(p) => {
            let before = state.facts.len();
            state.facts.retain(|f| f.id != p.fact_id);
            if state.facts.len() == before {
                debug!(fact_id = %p.fact_id, "Delete for unknown fact, ignoring");
            }
        }
    }
}

/// Move a document to the given stage, updating the run's stage counters
/// on a genuine transition. Unknown document ids are a benign race.
fn advance_document(state: &mut DiscoveryState, document_id: &str, status: DocumentStatus) {
    let Some(doc) = state.document_mut(document_id) else {
        debug!(
            document_id = %document_id,
            stage = ?status,
            "Stage event for unknown document, ignoring"
        );
        return;
    };

    if doc.status == status {
        return;
    }
    doc.status = status;

    if let Some(run) = state.run.as_mut() {
        match status {
            DocumentStatus::Chunking => run.stages.chunked += 1,
            DocumentStatus::Embedding => run.stages.embedded += 1,
            DocumentStatus::Stored => {
                run.stages.stored += 1;
                run.processed_count += 1;
            }
            DocumentStatus::Discovered | DocumentStatus::Error => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        DocumentFoundPayload, ErrorPayload, FactDeletedPayload, FactExtractedPayload,
        FactUpdatedPayload, StageProgressPayload, StartedPayload,
    };

    fn started(processing_id: &str, case_id: &str, total_files: u32) -> DiscoveryEvent {
        DiscoveryEvent::Started(StartedPayload {
            processing_id: processing_id.to_string(),
            case_id: case_id.to_string(),
            total_files,
        })
    }

    fn document_found(document_id: &str, processing_id: &str) -> DiscoveryEvent {
        DiscoveryEvent::DocumentFound(DocumentFoundPayload {
            document_id: document_id.to_string(),
            processing_id: processing_id.to_string(),
            name: format!("{}.pdf", document_id),
            size: 2048,
        })
    }

    fn fact_extracted(fact_id: &str, document_id: &str, content: &str) -> DiscoveryEvent {
        DiscoveryEvent::FactExtracted(FactExtractedPayload {
            fact_id: fact_id.to_string(),
            document_id: document_id.to_string(),
            content: content.to_string(),
            category: "liability".to_string(),
            confidence: 0.9,
        })
    }

    #[test]
    fn test_started_creates_run() {
        let mut state = DiscoveryState::default();
        reduce(&mut state, &started("p1", "c1", 5));

        let run = state.run.as_ref().unwrap();
        assert_eq!(run.id, "p1");
        assert_eq!(run.case_id, "c1");
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.total_files, 5);
    }

    #[test]
    fn test_started_replaces_run_but_keeps_documents() {
        let mut state = DiscoveryState::default();
        reduce(&mut state, &started("p1", "c1", 1));
        reduce(&mut state, &document_found("d1", "p1"));
        reduce(&mut state, &fact_extracted("f1", "d1", "X"));

        reduce(&mut state, &started("p2", "c1", 3));
        assert_eq!(state.processing_id(), Some("p2"));
        assert_eq!(state.run.as_ref().unwrap().processed_count, 0);
        // Prior runs' documents and facts are not removed by the client.
        assert_eq!(state.document("d1").unwrap().run_id, "p1");
        assert_eq!(state.facts.len(), 1);
    }

    #[test]
    fn test_document_stage_progression() {
        let mut state = DiscoveryState::default();
        reduce(&mut state, &started("p1", "c1", 1));
        reduce(&mut state, &document_found("d1", "p1"));

        let stage = |id: &str| {
            DiscoveryEvent::Stored(StageProgressPayload {
                document_id: id.to_string(),
            })
        };
        reduce(&mut state, &stage("d1"));

        assert_eq!(state.document("d1").unwrap().status, DocumentStatus::Stored);
        let run = state.run.as_ref().unwrap();
        assert_eq!(run.processed_count, 1);
        assert_eq!(run.stages.stored, 1);

        // Redelivered stage event does not double-count
        reduce(&mut state, &stage("d1"));
        assert_eq!(state.run.as_ref().unwrap().processed_count, 1);
    }

    #[test]
    fn test_stage_event_for_unknown_document_is_ignored() {
        let mut state = DiscoveryState::default();
        reduce(&mut state, &started("p1", "c1", 1));
        reduce(
            &mut state,
            &DiscoveryEvent::Chunking(StageProgressPayload {
                document_id: "nope".to_string(),
            }),
        );
        assert!(state.documents.is_empty());
        assert_eq!(state.run.as_ref().unwrap().status, RunStatus::Running);
    }

    #[test]
    fn test_fact_redelivery_converges() {
        let mut state = DiscoveryState::default();
        reduce(&mut state, &started("p1", "c1", 1));
        reduce(&mut state, &fact_extracted("f1", "d1", "first"));
        reduce(&mut state, &fact_extracted("f1", "d1", "second"));

        assert_eq!(state.facts.len(), 1);
        assert_eq!(state.fact("f1").unwrap().content, "second");
        assert_eq!(state.run.as_ref().unwrap().stages.facts_extracted, 1);
    }

    #[test]
    fn test_fact_updated_and_deleted() {
        let mut state = DiscoveryState::default();
        reduce(&mut state, &fact_extracted("f1", "d1", "old"));

        reduce(
            &mut state,
            &DiscoveryEvent::FactUpdated(FactUpdatedPayload {
                fact_id: "f1".to_string(),
                content: "new".to_string(),
            }),
        );
        assert_eq!(state.fact("f1").unwrap().content, "new");

        reduce(
            &mut state,
            &DiscoveryEvent::FactDeleted(FactDeletedPayload {
                fact_id: "f1".to_string(),
            }),
        );
        assert!(state.facts.is_empty());
    }

    #[test]
    fn test_error_is_run_fatal_and_records_stage() {
        let mut state = DiscoveryState::default();
        reduce(&mut state, &started("p1", "c1", 1));
        reduce(
            &mut state,
            &DiscoveryEvent::Error(ErrorPayload {
                error: "Embedding service unavailable".to_string(),
                stage: Some("embedding".to_string()),
            }),
        );

        let run = state.run.as_ref().unwrap();
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.errors, vec!["embedding: Embedding service unavailable"]);
        assert_eq!(
            state.last_error.as_deref(),
            Some("Embedding service unavailable")
        );
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let events = vec![
            started("p1", "c1", 2),
            document_found("d1", "p1"),
            fact_extracted("f1", "d1", "X"),
        ];

        let mut a = DiscoveryState::default();
        let mut b = DiscoveryState::default();
        for event in &events {
            reduce(&mut a, event);
            reduce(&mut b, event);
        }

        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let event = started("p1", "c1", 5);
        store.update(&mut |state| reduce(state, &event));

        assert_eq!(store.snapshot().processing_id(), Some("p1"));
    }
}
