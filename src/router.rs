//! Event router - decode, project, notify
//!
//! One task drains one queue, so events are projected in transport
//! delivery order with no batching or reordering. Each frame is decoded
//! by its wire name, applied to the store through the pure reducer, and
//! then forwarded to the host callbacks that care about it. Decode
//! failures are logged and skipped; they never interrupt the stream.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::Callbacks;
use crate::events::DiscoveryEvent;
use crate::projector::{reduce, StateStore};
use crate::state::{ExtractedFact, ReviewStatus};
use crate::transport::InboundFrame;

/// Spawn the router task. Stops on shutdown or when every listener
/// sender has been dropped.
pub fn spawn_router(
    store: Arc<dyn StateStore>,
    callbacks: Callbacks,
    mut frames_rx: mpsc::UnboundedReceiver<InboundFrame>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Event router started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Event router shutting down");
                    break;
                }
                frame = frames_rx.recv() => {
                    match frame {
                        Some(frame) => handle_frame(&store, &callbacks, frame),
                        None => {
                            debug!("Frame channel closed, router stopping");
                            break;
                        }
                    }
                }
            }
        }
    })
}

fn handle_frame(store: &Arc<dyn StateStore>, callbacks: &Callbacks, frame: InboundFrame) {
    let event = match DiscoveryEvent::decode(&frame.event, frame.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(event = %frame.event, error = %e, "Dropping undecodable event");
            return;
        }
    };

    debug!(event = event.name(), "Projecting event");
    store.update(&mut |state| reduce(state, &event));

    match &event {
        DiscoveryEvent::FactExtracted(p) => {
            if let Some(cb) = &callbacks.on_fact_extracted {
                cb(ExtractedFact {
                    id: p.fact_id.clone(),
                    document_id: p.document_id.clone(),
                    content: p.content.clone(),
                    category: p.category.clone(),
                    confidence: p.confidence,
                    review_status: ReviewStatus::Pending,
                });
            }
        }
        DiscoveryEvent::Completed(p) => {
            if let Some(cb) = &callbacks.on_processing_complete {
                cb(p.summary.clone());
            }
        }
        DiscoveryEvent::Error(p) => {
            // The callback sees the bare message only; stage metadata
            // stays in the run's error list.
            if let Some(cb) = &callbacks.on_error {
                cb(p.error.clone());
            }
        }
        _ => {}
    }
}
