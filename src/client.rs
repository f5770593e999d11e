//! Sync client lifecycle
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                      SyncClient                        │
//! │  - mount(): wire store + transport + callbacks         │
//! │  - update_fact()/delete_fact() via the command bridge  │
//! │  - set_interest(): switch case/run rooms atomically    │
//! │  - unmount(): tear down on every exit path             │
//! └────────────────────────────────────────────────────────┘
//!          │                    │                  │
//!          ▼                    ▼                  ▼
//!   SubscriptionManager    Event Router      CommandBridge
//!   (listeners + rooms)    (decode+project)  (correlated acks)
//! ```
//!
//! Lifecycle: `Unmounted → Mounted/Attached → (Disconnected ⇄
//! Reconnecting/Attached) → Unmounted`. On mount the client attaches
//! immediately if the transport is up, otherwise on the next connected
//! transition. Every rising connection edge re-runs attachment with the
//! latest interest after a short debounce, because server-side rooms and
//! listener state do not survive a reconnect. Reconnection never resets
//! projected state - only subscriptions are re-established.
//!
//! Unmount tears down listeners and room membership but does not cancel
//! in-flight command futures; those settle on their own and callers must
//! tolerate a resolution after teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::commands::CommandBridge;
use crate::config::SyncOptions;
use crate::error::SyncError;
use crate::projector::StateStore;
use crate::router::spawn_router;
use crate::subscription::{Interest, SubscriptionManager};
use crate::transport::EventTransport;

/// Real-time sync client for one case's discovery pipeline.
///
/// One instance owns one interest set and one registered-listener set on
/// the given transport. Concurrent instances with differing interests on
/// the same transport would double-dispatch events and are out of scope.
pub struct SyncClient {
    transport: Arc<dyn EventTransport>,
    subscriptions: Arc<SubscriptionManager>,
    bridge: CommandBridge,
    shutdown_tx: broadcast::Sender<()>,
    mounted: Arc<AtomicBool>,
}

impl SyncClient {
    /// Mount the client: spawn the router and reconnect supervisor, and
    /// attach if the transport is already connected.
    pub fn mount(
        transport: Arc<dyn EventTransport>,
        store: Arc<dyn StateStore>,
        options: SyncOptions,
    ) -> Self {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&transport),
            frames_tx,
            Interest::new(options.case_id.clone(), options.processing_id.clone()),
        ));
        let (shutdown_tx, _) = broadcast::channel(4);
        let mounted = Arc::new(AtomicBool::new(true));

        spawn_router(
            store,
            options.callbacks.clone(),
            frames_rx,
            shutdown_tx.subscribe(),
        );

        if transport.is_connected() {
            subscriptions.attach();
        } else {
            debug!("Transport not connected at mount, attaching on first connection");
        }

        // Spawned after the initial attach so the supervisor's first
        // observation cannot race it into a duplicate announcement.
        tokio::spawn(supervise_reconnects(
            Arc::clone(&transport),
            Arc::clone(&subscriptions),
            shutdown_tx.subscribe(),
            Arc::clone(&mounted),
            options.resubscribe_debounce,
        ));

        let bridge = CommandBridge::new(Arc::clone(&transport), Arc::clone(&subscriptions));

        info!(
            case_id = ?options.case_id,
            processing_id = ?options.processing_id,
            "Sync client mounted"
        );

        Self {
            transport,
            subscriptions,
            bridge,
            shutdown_tx,
            mounted,
        }
    }

    /// Current connection flag of the underlying transport.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// The active interest set.
    pub fn interest(&self) -> Interest {
        self.subscriptions.interest()
    }

    /// Ask the server to rewrite a fact. Local state is mutated only by
    /// the echoed `fact:updated` event, never by the ack.
    pub async fn update_fact(
        &self,
        fact_id: &str,
        content: &str,
        reason: Option<&str>,
    ) -> Result<(), SyncError> {
        self.bridge.update_fact(fact_id, content, reason).await
    }

    /// Ask the server to delete a fact. Local state is mutated only by
    /// the echoed `fact:deleted` event.
    pub async fn delete_fact(&self, fact_id: &str) -> Result<(), SyncError> {
        self.bridge.delete_fact(fact_id).await
    }

    /// Switch to a different case/run interest. The old room is left
    /// before the new one is announced; listeners stay registered
    /// throughout, so no event window is lost.
    pub fn set_interest(&self, case_id: Option<String>, processing_id: Option<String>) {
        let interest = Interest::new(case_id, processing_id);
        if self.subscriptions.interest() == interest {
            return;
        }

        self.subscriptions.detach();
        self.subscriptions.set_interest(interest);
        if self.transport.is_connected() {
            self.subscriptions.attach();
        }
        // Otherwise the reconnect supervisor attaches with the latest
        // interest on the next connected transition.
    }

    /// Tear down: stop the router and supervisor, unregister every
    /// listener, and announce the case unsubscribe if one was set.
    /// Idempotent; also runs on drop.
    pub fn unmount(&self) {
        if !self.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        self.subscriptions.detach();
        info!("Sync client unmounted");
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Watch the connection and re-run attachment, debounced, after every
/// connected notification. The watch channel coalesces values, so a
/// drop-and-reconnect flap can be observed as a single still-connected
/// notification; re-attaching on every one (rather than diffing the flag)
/// never misses it, and attachment is idempotent on the server side.
/// The debounce window is cancelled by unmount and restarted by
/// notifications inside it.
async fn supervise_reconnects(
    transport: Arc<dyn EventTransport>,
    subscriptions: Arc<SubscriptionManager>,
    mut shutdown_rx: broadcast::Receiver<()>,
    mounted: Arc<AtomicBool>,
    debounce: Duration,
) {
    let mut watch_rx = transport.connection_watch();

    // The first connection can land before this task first polls, in
    // which case its notification is already consumed by the initial
    // borrow. If the mount-time attach did not run, catch up here.
    if *watch_rx.borrow_and_update() && !subscriptions.is_attached() {
        if !debounce_window(&mut shutdown_rx, &mut watch_rx, debounce).await {
            return;
        }
        if mounted.load(Ordering::SeqCst) && transport.is_connected() {
            subscriptions.resubscribe();
        }
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            changed = watch_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if !*watch_rx.borrow_and_update() {
                    continue;
                }

                if !debounce_window(&mut shutdown_rx, &mut watch_rx, debounce).await {
                    return;
                }
                if mounted.load(Ordering::SeqCst) && transport.is_connected() {
                    subscriptions.resubscribe();
                }
            }
        }
    }

    debug!("Reconnect supervisor stopped");
}

/// Wait out the re-subscription debounce. Connected notifications inside
/// the window restart it; a disconnect ends it early (the caller's
/// connectivity check then skips the re-attach, and the next connected
/// notification re-arms). Returns `false` when the supervisor should stop.
async fn debounce_window(
    shutdown_rx: &mut broadcast::Receiver<()>,
    watch_rx: &mut tokio::sync::watch::Receiver<bool>,
    debounce: Duration,
) -> bool {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return false,
            changed = watch_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
                if *watch_rx.borrow_and_update() {
                    continue;
                }
                return true;
            }
            _ = sleep(debounce) => return true,
        }
    }
}
