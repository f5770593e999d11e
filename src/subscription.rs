//! Subscription manager - listener registration and room interest
//!
//! Owns two pieces of channel-facing state: the set of event names
//! registered on the transport (always empty or the full fixed set, never
//! partial) and the single interest set announced to the server. Server
//! rooms and listener state do not survive a transport-level reconnect,
//! so the client re-runs attachment with the latest interest after every
//! reconnect; that path goes through [`SubscriptionManager::resubscribe`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::events::{CaseRoom, INBOUND_EVENTS, SUBSCRIBE_CASE, UNSUBSCRIBE_CASE};
use crate::transport::{EventTransport, InboundFrame};

/// The (case id, optional processing id) pair the client wants server-side
/// room membership for. Exactly one interest set is active per client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interest {
    pub case_id: Option<String>,
    pub processing_id: Option<String>,
}

impl Interest {
    pub fn new(case_id: Option<String>, processing_id: Option<String>) -> Self {
        Self {
            case_id,
            processing_id,
        }
    }
}

pub struct SubscriptionManager {
    transport: Arc<dyn EventTransport>,
    /// All registered listeners feed this one queue, preserving delivery order.
    router_tx: mpsc::UnboundedSender<InboundFrame>,
    interest: Mutex<Interest>,
    /// Guards against double-registration; attach is idempotent.
    registered: AtomicBool,
}

impl SubscriptionManager {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        router_tx: mpsc::UnboundedSender<InboundFrame>,
        interest: Interest,
    ) -> Self {
        Self {
            transport,
            router_tx,
            interest: Mutex::new(interest),
            registered: AtomicBool::new(false),
        }
    }

    pub fn interest(&self) -> Interest {
        self.lock_interest().clone()
    }

    pub fn set_interest(&self, interest: Interest) {
        *self.lock_interest() = interest;
    }

    /// Case id of the active interest, if one is set.
    pub fn active_case(&self) -> Option<String> {
        self.lock_interest().case_id.clone()
    }

    /// Whether the listener set is currently registered.
    pub fn is_attached(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Register the full fixed listener set and announce the case
    /// interest. Idempotent: a second attach without an intervening
    /// detach is a no-op.
    pub fn attach(&self) {
        if self.registered.swap(true, Ordering::SeqCst) {
            debug!("Already attached, skipping");
            return;
        }
        self.register_listeners();
        self.announce();
    }

    /// Remove every registered listener and, if a case interest was set,
    /// announce the unsubscribe. Safe to call when never attached.
    pub fn detach(&self) {
        if !self.registered.swap(false, Ordering::SeqCst) {
            return;
        }

        for event in INBOUND_EVENTS {
            self.transport.off(event);
        }

        if let Some(case_id) = self.active_case() {
            // After a real disconnect the server already dropped the room;
            // a failed emission here is expected and harmless.
            match self.announce_room(UNSUBSCRIBE_CASE, &case_id) {
                Ok(()) => info!(case_id = %case_id, "Unsubscribed from case"),
                Err(e) => debug!(case_id = %case_id, error = %e, "Unsubscribe announcement skipped"),
            }
        }
    }

    /// Re-run attachment with the latest interest after a reconnect.
    /// Bypasses the idempotence guard: the server has forgotten us even
    /// if the local flag says we are attached.
    pub fn resubscribe(&self) {
        self.register_listeners();
        self.announce();
        self.registered.store(true, Ordering::SeqCst);
        info!("Subscriptions re-established after reconnect");
    }

    fn register_listeners(&self) {
        for event in INBOUND_EVENTS {
            self.transport.on(event, self.router_tx.clone());
        }
    }

    fn announce(&self) {
        if let Some(case_id) = self.active_case() {
            match self.announce_room(SUBSCRIBE_CASE, &case_id) {
                Ok(()) => info!(case_id = %case_id, "Subscribed to case"),
                Err(e) => debug!(case_id = %case_id, error = %e, "Subscribe announcement failed"),
            }
        }
    }

    fn announce_room(&self, event: &str, case_id: &str) -> Result<(), crate::error::SyncError> {
        let room = CaseRoom {
            case_id: case_id.to_string(),
        };
        self.transport.emit(event, serde_json::to_value(&room)?)
    }

    fn lock_interest(&self) -> std::sync::MutexGuard<'_, Interest> {
        self.interest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;
    use serde_json::json;

    fn manager(
        transport: &Arc<MemoryTransport>,
        case_id: Option<&str>,
    ) -> SubscriptionManager {
        let (router_tx, _router_rx) = mpsc::unbounded_channel();
        SubscriptionManager::new(
            Arc::clone(transport) as Arc<dyn EventTransport>,
            router_tx,
            Interest::new(case_id.map(String::from), None),
        )
    }

    #[tokio::test]
    async fn test_attach_registers_full_set_once() {
        let transport = Arc::new(MemoryTransport::new(true));
        let manager = manager(&transport, Some("c1"));

        manager.attach();
        manager.attach(); // idempotent

        assert_eq!(transport.listener_count(), INBOUND_EVENTS.len());
        for event in INBOUND_EVENTS {
            assert!(transport.has_listener(event));
        }
        assert_eq!(
            transport.emitted_named(SUBSCRIBE_CASE),
            vec![json!({ "case_id": "c1" })]
        );
    }

    #[tokio::test]
    async fn test_attach_without_case_skips_announcement() {
        let transport = Arc::new(MemoryTransport::new(true));
        let manager = manager(&transport, None);

        manager.attach();

        assert_eq!(transport.listener_count(), INBOUND_EVENTS.len());
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_detach_removes_everything() {
        let transport = Arc::new(MemoryTransport::new(true));
        let manager = manager(&transport, Some("c1"));

        manager.attach();
        manager.detach();
        manager.detach(); // safe to repeat

        assert_eq!(transport.listener_count(), 0);
        assert_eq!(
            transport.emitted_named(UNSUBSCRIBE_CASE),
            vec![json!({ "case_id": "c1" })]
        );
    }

    #[tokio::test]
    async fn test_resubscribe_reannounces() {
        let transport = Arc::new(MemoryTransport::new(true));
        let manager = manager(&transport, Some("c1"));

        manager.attach();
        manager.resubscribe();

        assert_eq!(transport.listener_count(), INBOUND_EVENTS.len());
        assert_eq!(transport.emitted_named(SUBSCRIBE_CASE).len(), 2);
    }
}
