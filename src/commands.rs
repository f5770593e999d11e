//! Command/response bridge - correlated fact commands
//!
//! Turns the transport's callback-shaped acknowledgment primitive into
//! awaitable results. Both commands guard connectivity and the active
//! case interest before anything reaches the wire, expect exactly one
//! acknowledgment, and never retry - retry policy belongs to the caller.
//!
//! A successful command does not touch local state. The authoritative
//! `fact:updated` / `fact:deleted` event, echoed by the server to every
//! room subscriber including the issuer, is the sole mutation path; that
//! keeps one consistent path no matter who triggered the change.
//!
//! Known limitation: no client-side ack timeout. A server that never
//! answers leaves the future pending until the connection drops, at
//! which point the transport rejects the pending ack.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::SyncError;
use crate::events::{CommandAck, FactDeleteRequest, FactUpdateRequest, FACT_DELETE, FACT_UPDATE};
use crate::subscription::SubscriptionManager;
use crate::transport::EventTransport;

pub struct CommandBridge {
    transport: Arc<dyn EventTransport>,
    subscriptions: Arc<SubscriptionManager>,
}

impl CommandBridge {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            transport,
            subscriptions,
        }
    }

    /// Ask the server to rewrite a fact's content.
    pub async fn update_fact(
        &self,
        fact_id: &str,
        content: &str,
        reason: Option<&str>,
    ) -> Result<(), SyncError> {
        let case_id = self.guard()?;
        let request = FactUpdateRequest {
            case_id,
            fact_id: fact_id.to_string(),
            content: content.to_string(),
            reason: reason.map(String::from),
        };
        self.send(FACT_UPDATE, serde_json::to_value(&request)?)
            .await
    }

    /// Ask the server to delete a fact.
    pub async fn delete_fact(&self, fact_id: &str) -> Result<(), SyncError> {
        let case_id = self.guard()?;
        let request = FactDeleteRequest {
            case_id,
            fact_id: fact_id.to_string(),
        };
        self.send(FACT_DELETE, serde_json::to_value(&request)?)
            .await
    }

    /// Commands must not race ahead of subscription setup: reject before
    /// emission unless the transport is up and a case interest is active.
    fn guard(&self) -> Result<String, SyncError> {
        if !self.transport.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.subscriptions
            .active_case()
            .ok_or(SyncError::NoActiveCase)
    }

    async fn send(&self, event: &str, payload: JsonValue) -> Result<(), SyncError> {
        debug!(event = %event, "Sending correlated command");

        let ack_rx = self.transport.emit_with_ack(event, payload);
        let ack_payload = ack_rx.await.map_err(|_| SyncError::AckChannelClosed)??;

        let ack: CommandAck = serde_json::from_value(ack_payload).unwrap_or_default();
        if ack.success {
            Ok(())
        } else {
            Err(SyncError::CommandRejected(
                ack.error.unwrap_or_else(|| "Command failed".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Interest;
    use crate::transport::memory::MemoryTransport;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn bridge(transport: &Arc<MemoryTransport>, case_id: Option<&str>) -> CommandBridge {
        let (router_tx, _router_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(transport) as Arc<dyn EventTransport>,
            router_tx,
            Interest::new(case_id.map(String::from), None),
        ));
        CommandBridge::new(
            Arc::clone(transport) as Arc<dyn EventTransport>,
            subscriptions,
        )
    }

    #[tokio::test]
    async fn test_update_fact_success() {
        let transport = Arc::new(MemoryTransport::new(true));
        let bridge = bridge(&transport, Some("c1"));

        let call = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move {
                // Answer the command once it shows up.
                loop {
                    if let Some(pending) = transport.take_pending_ack() {
                        assert_eq!(pending.event, FACT_UPDATE);
                        assert_eq!(
                            pending.payload,
                            json!({
                                "case_id": "c1",
                                "fact_id": "f1",
                                "content": "new content",
                                "reason": "reason"
                            })
                        );
                        pending.respond_success();
                        break;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
            }
        });

        bridge
            .update_fact("f1", "new content", Some("reason"))
            .await
            .unwrap();
        call.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_rejection_propagates_message() {
        let transport = Arc::new(MemoryTransport::new(true));
        let bridge = bridge(&transport, Some("c1"));

        let responder = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move {
                loop {
                    if let Some(pending) = transport.take_pending_ack() {
                        pending.respond_failure("fact not found");
                        break;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
            }
        });

        let result = bridge.delete_fact("missing").await;
        responder.await.unwrap();

        match result {
            Err(SyncError::CommandRejected(message)) => assert_eq!(message, "fact not found"),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnected_rejects_without_emission() {
        let transport = Arc::new(MemoryTransport::new(false));
        let bridge = bridge(&transport, Some("c1"));

        let result = bridge.update_fact("f1", "X", None).await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
        assert_eq!(transport.pending_ack_count(), 0);
        assert!(transport.emitted().is_empty());
    }

    #[tokio::test]
    async fn test_no_case_interest_rejects() {
        let transport = Arc::new(MemoryTransport::new(true));
        let bridge = bridge(&transport, None);

        let result = bridge.delete_fact("f1").await;
        assert!(matches!(result, Err(SyncError::NoActiveCase)));
        assert_eq!(transport.pending_ack_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_while_pending_rejects() {
        let transport = Arc::new(MemoryTransport::new(true));
        let bridge = bridge(&transport, Some("c1"));

        let dropper = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                transport.set_connected(false);
            }
        });

        let result = bridge.update_fact("f1", "X", None).await;
        dropper.await.unwrap();
        assert!(matches!(result, Err(SyncError::AckChannelClosed)));
    }
}
