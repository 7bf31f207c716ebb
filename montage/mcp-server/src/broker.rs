//! Request/response correlation broker.
//!
//! Turns the unordered message exchange with the plugin into synchronous
//! calls: every outgoing instruction gets a fresh uuid, a waiter is parked in
//! the pending table under that id, and the transport's read loop fires the
//! waiter when a response carrying the same id arrives. Each call waits at
//! most a bounded time; late responses fall through to the unsolicited path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::registry::ConnectionRegistry;
use crate::types::{InstructionMessage, ResponseMessage};

/// Failures surfaced to callers of [`InstructionBroker::call`].
///
/// All three are recoverable from the caller's point of view: retry once a
/// plugin reconnects, or report the stall upstream.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("no plugin connection available")]
    NoPeerAvailable,

    #[error("failed to deliver instruction to plugin: {0}")]
    SendFailed(String),

    #[error("no response from plugin within {0:?}")]
    ResponseTimeout(Duration),
}

type PendingTable = Mutex<HashMap<String, oneshot::Sender<ResponseMessage>>>;

/// Correlates instructions sent to the plugin with the responses it returns.
pub struct InstructionBroker {
    registry: Arc<ConnectionRegistry>,

    /// Map whose key is the `id` of a response we are expecting and whose
    /// value is the channel the waiting call listens on. Entries are removed
    /// by [`Self::handle_message`] on a match, or by the waiter's cleanup
    /// guard on timeout and every other exit path.
    pending: PendingTable,

    call_timeout: Duration,
}

impl InstructionBroker {
    pub fn new(registry: Arc<ConnectionRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            pending: Mutex::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Send an instruction and wait for the correlated response, with the
    /// default timeout.
    pub async fn call(&self, action: &str, data: Value) -> Result<ResponseMessage, CallError> {
        self.call_with_timeout(action, data, self.call_timeout).await
    }

    /// Send an instruction and wait for the correlated response.
    ///
    /// The returned message carries either a `result` or an `error` payload;
    /// deciding what a plugin-reported error means is up to the caller.
    pub async fn call_with_timeout(
        &self,
        action: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<ResponseMessage, CallError> {
        debug_assert!(!action.is_empty());

        // Fast-fail before generating an id or touching the pending table.
        let Some(target) = self.registry.current_target() else {
            warn!("no plugin connected, cannot send {action}");
            return Err(CallError::NoPeerAvailable);
        };

        let id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            // 128-bit random ids do not collide in practice.
            debug_assert!(!pending.contains_key(&id));
            pending.insert(id.clone(), reply_tx);
        }
        // Registered before the send so a response cannot race past us; the
        // guard removes the entry again on every exit path below, including
        // cancellation of this future.
        let _cleanup = PendingCleanup {
            pending: &self.pending,
            id: &id,
        };

        let message = InstructionMessage {
            id: id.clone(),
            action: action.to_string(),
            data,
        };
        let frame =
            serde_json::to_string(&message).map_err(|e| CallError::SendFailed(e.to_string()))?;
        target
            .send_frame(frame)
            .map_err(|e| CallError::SendFailed(e.to_string()))?;
        debug!(action, %id, "instruction sent to plugin {}", target.id());

        tokio::select! {
            reply = reply_rx => reply.map_err(|_| {
                CallError::SendFailed("response channel closed before a reply arrived".to_string())
            }),
            _ = tokio::time::sleep(timeout) => {
                warn!(action, %id, "plugin did not respond within {timeout:?}");
                Err(CallError::ResponseTimeout(timeout))
            }
        }
    }

    /// Inbound hook invoked by the transport for every frame read from a
    /// plugin.
    ///
    /// Absorbs every failure: malformed or unsolicited messages are logged
    /// and dropped, never raised back to the read loop. A duplicate response
    /// finds no pending entry and is a logged no-op.
    pub fn handle_message(&self, raw: &str) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("dropping undecodable message from plugin: {e}");
                return;
            }
        };

        let Some(response) = ResponseMessage::from_value(&value) else {
            debug!("ignoring non-response message from plugin: {value}");
            return;
        };

        let Some(reply_tx) = self.pending.lock().unwrap().remove(&response.id) else {
            debug!(
                id = %response.id,
                "no pending call for response (late, duplicate, or unsolicited), dropping"
            );
            return;
        };

        // The waiter may have timed out between our lookup and this send; its
        // half of the channel is then already gone.
        if reply_tx.send(response).is_err() {
            debug!("caller gave up before its response arrived");
        }
    }

    /// Number of calls currently waiting on a response, for diagnostics.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

/// Removes a pending-table entry when the owning call leaves scope.
struct PendingCleanup<'a> {
    pending: &'a PendingTable,
    id: &'a str,
}

impl Drop for PendingCleanup<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(self.id);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::PluginConnection;
    use serde_json::json;
    use std::collections::HashSet;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn test_broker(timeout: Duration) -> (Arc<InstructionBroker>, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let broker = Arc::new(InstructionBroker::new(registry.clone(), timeout));
        (broker, registry)
    }

    /// Register a fake plugin and return the receiver carrying its outbound
    /// frames.
    fn connect_plugin(
        registry: &ConnectionRegistry,
        id: u64,
    ) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.add(Arc::new(PluginConnection::new(id, tx)));
        rx
    }

    fn result_frame(id: &str, result: Value) -> String {
        json!({ "id": id, "result": result }).to_string()
    }

    #[tokio::test]
    async fn round_trip_resolves_call() {
        let (broker, registry) = test_broker(Duration::from_secs(5));
        let mut outbound = connect_plugin(&registry, 0);

        let responder = {
            let broker = broker.clone();
            tokio::spawn(async move {
                let frame = outbound.recv().await.expect("instruction frame");
                let message: InstructionMessage = serde_json::from_str(&frame).unwrap();
                assert_eq!(message.action, "getActiveProject");
                assert_eq!(message.data, json!({}));
                broker.handle_message(&result_frame(&message.id, json!({"name": "demo"})));
            })
        };

        let reply = tokio_test::assert_ok!(broker.call("getActiveProject", json!({})).await);
        assert_eq!(reply.result, Some(json!({"name": "demo"})));
        assert!(reply.error.is_none());
        assert_eq!(broker.pending_count(), 0);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn call_without_plugin_fast_fails() {
        let (broker, _registry) = test_broker(Duration::from_secs(5));

        let err = tokio_test::assert_err!(broker.call("saveProject", json!({})).await);
        assert!(matches!(err, CallError::NoPeerAvailable));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn timeout_removes_pending_call() {
        let (broker, registry) = test_broker(Duration::from_secs(5));
        let _outbound = connect_plugin(&registry, 0);

        let err = broker
            .call_with_timeout("getActiveSequence", json!({}), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::ResponseTimeout(_)));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn late_response_is_dropped_without_side_effects() {
        let (broker, registry) = test_broker(Duration::from_secs(5));
        let mut outbound = connect_plugin(&registry, 0);

        let err = broker
            .call_with_timeout("getPlayerPosition", json!({}), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::ResponseTimeout(_)));
        let stale: InstructionMessage =
            serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();

        // A second call is in flight when the stale response shows up.
        let in_flight = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.call("getActiveProject", json!({})).await })
        };
        let live: InstructionMessage =
            serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();
        assert_eq!(broker.pending_count(), 1);

        broker.handle_message(&result_frame(&stale.id, json!("too late")));
        assert_eq!(broker.pending_count(), 1);

        broker.handle_message(&result_frame(&live.id, json!("ok")));
        let reply = in_flight.await.unwrap().unwrap();
        assert_eq!(reply.result, Some(json!("ok")));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_response_fires_waiter_once() {
        let (broker, registry) = test_broker(Duration::from_secs(5));
        let mut outbound = connect_plugin(&registry, 0);

        let in_flight = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.call("getSequenceList", json!({})).await })
        };
        let message: InstructionMessage =
            serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();

        broker.handle_message(&result_frame(&message.id, json!("first")));
        broker.handle_message(&result_frame(&message.id, json!("second")));

        let reply = in_flight.await.unwrap().unwrap();
        assert_eq!(reply.result, Some(json!("first")));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_use_distinct_ids() {
        const CALLS: usize = 32;

        let (broker, registry) = test_broker(Duration::from_secs(5));
        let mut outbound = connect_plugin(&registry, 0);

        let responder = {
            let broker = broker.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..CALLS {
                    let frame = outbound.recv().await.expect("instruction frame");
                    let message: InstructionMessage = serde_json::from_str(&frame).unwrap();
                    broker.handle_message(&result_frame(&message.id, Value::Null));
                    seen.push(message.id);
                }
                seen
            })
        };

        let mut calls = tokio::task::JoinSet::new();
        for _ in 0..CALLS {
            let broker = broker.clone();
            calls.spawn(async move { broker.call("getSequenceList", json!({})).await });
        }
        while let Some(result) = calls.join_next().await {
            assert!(result.unwrap().is_ok());
        }

        let ids: HashSet<String> = responder.await.unwrap().into_iter().collect();
        assert_eq!(ids.len(), CALLS);
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn malformed_messages_never_resolve_calls() {
        let (broker, registry) = test_broker(Duration::from_secs(5));
        let mut outbound = connect_plugin(&registry, 0);

        let in_flight = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.call("getActiveProject", json!({})).await })
        };
        let message: InstructionMessage =
            serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();

        broker.handle_message("not json at all");
        broker.handle_message(r#"{"result": true}"#);
        broker.handle_message(r#"{"id": "orphan"}"#);
        broker.handle_message("[1, 2, 3]");
        assert_eq!(broker.pending_count(), 1);

        broker.handle_message(&result_frame(&message.id, json!(true)));
        let reply = in_flight.await.unwrap().unwrap();
        assert_eq!(reply.result, Some(json!(true)));
    }

    #[tokio::test]
    async fn dead_connection_surfaces_send_failed() {
        let (broker, registry) = test_broker(Duration::from_secs(5));
        let outbound = connect_plugin(&registry, 0);
        drop(outbound);

        let err = broker.call("saveProject", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::SendFailed(_)));
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn plugin_error_payload_reaches_caller() {
        let (broker, registry) = test_broker(Duration::from_secs(5));
        let mut outbound = connect_plugin(&registry, 0);

        let responder = {
            let broker = broker.clone();
            tokio::spawn(async move {
                let message: InstructionMessage =
                    serde_json::from_str(&outbound.recv().await.unwrap()).unwrap();
                broker.handle_message(
                    &json!({ "id": message.id, "error": "no active project" }).to_string(),
                );
            })
        };

        let reply = broker.call("getActiveProject", json!({})).await.unwrap();
        assert!(reply.result.is_none());
        assert_eq!(reply.error.as_deref(), Some("no active project"));
        responder.await.unwrap();
    }
}
