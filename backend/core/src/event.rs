use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A lifecycle event published on the protocol event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

/// Categories of lifecycle events observers can subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentRegistered,
    AgentUnregistered,
    TaskSubmitted,
    TaskAcknowledged,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    MandateCreated,
    MandateAuthorized,
    MandateExpired,
    MandateCancelled,
    MandateExecuted,
    TransactionStarted,
    TransactionSettled,
    TransactionFailed,
    TransactionRefunded,
}

impl ProtocolEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

/// Broadcast bus for lifecycle events.
///
/// Components receive a clone at construction time, so listeners are
/// statically declared dependencies rather than implicit subscriptions.
/// Publishing never fails the caller; lagging receivers drop events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProtocolEvent>,
}

const DEFAULT_BUS_CAPACITY: usize = 256;

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, kind: EventKind, payload: serde_json::Value) {
        let event = ProtocolEvent::new(kind, payload);
        tracing::debug!(kind = %event.kind, "protocol event");
        // No receivers is fine; events are advisory.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
