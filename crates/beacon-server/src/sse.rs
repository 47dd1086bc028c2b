//! SSE fan-out hub.
//!
//! A bounded registry of subscribers, each owning a bounded message queue
//! and an optional `{agent_type, event_type}` filter. Publishing never
//! blocks: a subscriber whose queue is full (or whose stream has gone
//! away) is dropped from the registry so the slow consumer can't stall
//! the rest. Registry membership is what `sse_clients` in the health
//! endpoint reports.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-subscriber queue depth. A consumer this far behind is dropped.
const QUEUE_CAPACITY: usize = 256;

/// Per-client message filter. A set field must compare equal on the
/// payload; a missing payload field never matches.
#[derive(Clone, Debug, Default)]
pub struct SubscriberFilter {
    pub agent_type: Option<String>,
    pub event_type: Option<String>,
}

impl SubscriberFilter {
    /// Whether this filter admits a payload.
    pub fn matches(&self, payload: &Value) -> bool {
        let field_matches = |field: &str, expected: &Option<String>| match expected {
            None => true,
            Some(want) => payload
                .get(field)
                .and_then(Value::as_str)
                .map(|have| have == want)
                .unwrap_or(false),
        };
        field_matches("agent_type", &self.agent_type)
            && field_matches("event_type", &self.event_type)
    }

    fn is_empty(&self) -> bool {
        self.agent_type.is_none() && self.event_type.is_none()
    }
}

struct Client {
    tx: mpsc::Sender<String>,
    filter: SubscriberFilter,
}

/// The hub. Shared behind an `Arc`; subscriber guards unregister
/// themselves on drop.
pub struct SseHub {
    max_clients: usize,
    clients: RwLock<HashMap<String, Client>>,
}

/// A live subscription: the queue receiver plus the RAII registry guard.
pub struct Subscriber {
    pub id: String,
    pub rx: mpsc::Receiver<String>,
    _guard: SubscriberGuard,
}

struct SubscriberGuard {
    hub: Arc<SseHub>,
    id: String,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.hub.remove(&self.id);
    }
}

impl SseHub {
    /// Create a hub bounded at `max_clients` subscribers.
    pub fn new(max_clients: usize) -> Self {
        Self {
            max_clients,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber. Returns `None` when the registry is full —
    /// the registry is left untouched in that case.
    pub fn subscribe(hub: &Arc<Self>, filter: SubscriberFilter) -> Option<Subscriber> {
        let id = uuid::Uuid::now_v7().to_string();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        {
            let mut clients = hub.clients.write();
            if clients.len() >= hub.max_clients {
                return None;
            }
            let _ = clients.insert(id.clone(), Client { tx: tx.clone(), filter });
        }

        // First frame on every stream.
        let connected = json!({
            "type": "connected",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        let _ = tx.try_send(connected.to_string());

        debug!(subscriber = %id, "sse subscriber registered");
        Some(Subscriber {
            _guard: SubscriberGuard {
                hub: Arc::clone(hub),
                id: id.clone(),
            },
            id,
            rx,
        })
    }

    /// Publish one message to every matching subscriber, non-blocking.
    pub fn publish(&self, message_type: &str, payload: &Value) {
        let frame = json!({ "type": message_type, "payload": payload }).to_string();

        let mut dropped = Vec::new();
        {
            let clients = self.clients.read();
            for (id, client) in clients.iter() {
                if !client.filter.is_empty() && !client.filter.matches(payload) {
                    continue;
                }
                if client.tx.try_send(frame.clone()).is_err() {
                    dropped.push(id.clone());
                }
            }
        }

        for id in dropped {
            warn!(subscriber = %id, "dropping unresponsive sse subscriber");
            self.remove(&id);
        }
    }

    /// Number of registered subscribers.
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Configured registry bound.
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    fn remove(&self, id: &str) {
        let _ = self.clients.write().remove(id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(max: usize) -> Arc<SseHub> {
        Arc::new(SseHub::new(max))
    }

    fn frame_type(frame: &str) -> String {
        let value: Value = serde_json::from_str(frame).unwrap();
        value["type"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn subscriber_receives_connected_frame_first() {
        let hub = hub(4);
        let mut sub = SseHub::subscribe(&hub, SubscriberFilter::default()).unwrap();
        let first = sub.rx.recv().await.unwrap();
        assert_eq!(frame_type(&first), "connected");
    }

    #[tokio::test]
    async fn publish_reaches_all_unfiltered_subscribers() {
        let hub = hub(4);
        let mut a = SseHub::subscribe(&hub, SubscriberFilter::default()).unwrap();
        let mut b = SseHub::subscribe(&hub, SubscriberFilter::default()).unwrap();
        let _ = a.rx.recv().await;
        let _ = b.rx.recv().await;

        hub.publish("event", &json!({"agent_type": "codex"}));
        assert_eq!(frame_type(&a.rx.recv().await.unwrap()), "event");
        assert_eq!(frame_type(&b.rx.recv().await.unwrap()), "event");
    }

    #[tokio::test]
    async fn registry_bound_enforced_without_mutation() {
        let hub = hub(1);
        let _first = SseHub::subscribe(&hub, SubscriberFilter::default()).unwrap();
        assert!(SseHub::subscribe(&hub, SubscriberFilter::default()).is_none());
        assert_eq!(hub.client_count(), 1);
    }

    #[tokio::test]
    async fn slot_frees_when_subscriber_dropped() {
        let hub = hub(1);
        let first = SseHub::subscribe(&hub, SubscriberFilter::default()).unwrap();
        drop(first);
        assert_eq!(hub.client_count(), 0);
        assert!(SseHub::subscribe(&hub, SubscriberFilter::default()).is_some());
    }

    #[tokio::test]
    async fn filter_matches_on_equality() {
        let hub = hub(4);
        let mut codex = SseHub::subscribe(&hub, SubscriberFilter {
                agent_type: Some("codex".into()),
                event_type: None,
            })
            .unwrap();
        let _ = codex.rx.recv().await;

        hub.publish("event", &json!({"agent_type": "claude_code"}));
        hub.publish("event", &json!({"agent_type": "codex"}));

        let frame = codex.rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["payload"]["agent_type"], "codex");
        assert!(codex.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_payload_field_never_matches() {
        let hub = hub(4);
        let mut filtered = SseHub::subscribe(&hub, SubscriberFilter {
                agent_type: Some("codex".into()),
                event_type: None,
            })
            .unwrap();
        let _ = filtered.rx.recv().await;

        // Stats payloads carry no agent_type, so a filtered client skips them.
        hub.publish("stats", &json!({"total_events": 5}));
        assert!(filtered.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn both_filter_fields_must_match() {
        let hub = hub(4);
        let mut sub = SseHub::subscribe(&hub, SubscriberFilter {
                agent_type: Some("codex".into()),
                event_type: Some("tool_use".into()),
            })
            .unwrap();
        let _ = sub.rx.recv().await;

        hub.publish("event", &json!({"agent_type": "codex", "event_type": "error"}));
        assert!(sub.rx.try_recv().is_err());

        hub.publish("event", &json!({"agent_type": "codex", "event_type": "tool_use"}));
        assert!(sub.rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn frames_arrive_in_publish_order() {
        let hub = hub(4);
        let mut sub = SseHub::subscribe(&hub, SubscriberFilter::default()).unwrap();
        let _ = sub.rx.recv().await;

        for i in 0..10 {
            hub.publish("event", &json!({"seq": i}));
        }
        for i in 0..10 {
            let frame: Value = serde_json::from_str(&sub.rx.recv().await.unwrap()).unwrap();
            assert_eq!(frame["payload"]["seq"], i);
        }
    }

    #[tokio::test]
    async fn saturated_queue_drops_subscriber() {
        let hub = hub(4);
        let sub = SseHub::subscribe(&hub, SubscriberFilter::default()).unwrap();
        // Never drain: overflow the queue (+1 for the connected frame).
        for i in 0..(QUEUE_CAPACITY + 1) {
            hub.publish("event", &json!({"seq": i}));
        }
        assert_eq!(hub.client_count(), 0);
        drop(sub);
    }

    #[tokio::test]
    async fn publish_to_empty_hub_is_fine() {
        let hub = hub(4);
        hub.publish("stats", &json!({}));
        assert_eq!(hub.client_count(), 0);
    }
}
