//! Typed topic bus carrying domain events between components and out to
//! subscribers, with per-handler timeout and at-least-once in-process
//! delivery.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::models::{AgentStatus, TaskStatus};

/// Every handler runs under this budget; exceeding it cancels that handler's
/// future and logs a timeout, but never stops delivery to the others.
pub const HANDLER_TIMEOUT: Duration = Duration::from_secs(15);

/// Domain events carried by the bus. The topic name (used for subscription
/// and for the wire envelope's `type` field) is derived from the variant via
/// [`DomainEvent::topic`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum DomainEvent {
    TaskCreated { task_id: String },
    TaskStatusChanged { task_id: String, old_status: TaskStatus, new_status: TaskStatus },
    TaskClosed { task_id: String },
    TaskAssigned { task_id: String, process_name: String, agent_id: String },
    TaskUnassigned { task_id: String, process_name: String },
    AgentStarted { agent_id: String },
    AgentStopped { agent_id: String },
    AgentStatusChanged { agent_id: String, status: AgentStatus },
    ApprovalRequested { interaction_id: String },
    ApprovalGranted { interaction_id: String },
    ApprovalRejected { interaction_id: String },
    GitCommitted { task_id: String, sha: String },
    GitPushed { task_id: String },
    GitMerged { task_id: String },
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::TaskCreated { .. } => "task.created",
            DomainEvent::TaskStatusChanged { .. } => "task.status_changed",
            DomainEvent::TaskClosed { .. } => "task.closed",
            DomainEvent::TaskAssigned { .. } => "task.assigned",
            DomainEvent::TaskUnassigned { .. } => "task.unassigned",
            DomainEvent::AgentStarted { .. } => "agent.started",
            DomainEvent::AgentStopped { .. } => "agent.stopped",
            DomainEvent::AgentStatusChanged { .. } => "agent.status_changed",
            DomainEvent::ApprovalRequested { .. } => "approval.requested",
            DomainEvent::ApprovalGranted { .. } => "approval.granted",
            DomainEvent::ApprovalRejected { .. } => "approval.rejected",
            DomainEvent::GitCommitted { .. } => "git.committed",
            DomainEvent::GitPushed { .. } => "git.pushed",
            DomainEvent::GitMerged { .. } => "git.merged",
        }
    }
}

/// Serialized wire envelope every published event round-trips through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub data: Value,
}

impl EventEnvelope {
    pub fn wrap(event: &DomainEvent, source: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event.topic().to_string(),
            timestamp: Utc::now(),
            source: source.to_string(),
            data: serde_json::to_value(event).unwrap_or(Value::Null),
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Handler = dyn Fn(EventEnvelope) -> HandlerFuture + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    handler: Arc<Handler>,
}

/// Topic bus over [`DomainEvent`]. Publishers enqueue and return; each
/// registered handler runs in its own spawned task under
/// [`HANDLER_TIMEOUT`], so a slow or panicking handler never blocks the
/// publisher or its sibling handlers.
pub struct EventBus {
    next_id: AtomicU64,
    handlers: std::sync::Mutex<HashMap<&'static str, Vec<Registration>>>,
    inflight: Arc<AsyncMutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            handlers: std::sync::Mutex::new(HashMap::new()),
            inflight: Arc::new(AsyncMutex::new(Vec::new())),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `topic`. Multiple independent handlers may
    /// share a topic; each receives every published message once.
    pub fn subscribe<F, Fut>(&self, topic: &'static str, handler: F) -> SubscriptionId
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let wrapped: Arc<Handler> = Arc::new(move |env| Box::pin(handler(env)));
        self.handlers
            .lock()
            .unwrap()
            .entry(topic)
            .or_default()
            .push(Registration { id, handler: wrapped });
        id
    }

    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(list) = handlers.get_mut(topic) {
            list.retain(|r| r.id != id);
        }
    }

    /// Enqueue `event` for delivery to every handler subscribed to its
    /// topic. Returns immediately; handler execution happens on spawned
    /// tasks owned by the bus.
    pub fn publish(&self, event: DomainEvent, source: &str) {
        let envelope = EventEnvelope::wrap(&event, source);
        let registrations: Vec<Arc<Handler>> = {
            let handlers = self.handlers.lock().unwrap();
            handlers
                .get(event.topic())
                .map(|list| list.iter().map(|r| r.handler.clone()).collect())
                .unwrap_or_default()
        };

        let inflight = self.inflight.clone();
        for handler in registrations {
            let envelope = envelope.clone();
            let topic = envelope.event_type.clone();
            let join = tokio::spawn(async move {
                match tokio::time::timeout(HANDLER_TIMEOUT, handler(envelope)).await {
                    Ok(()) => {}
                    Err(_) => {
                        tracing::error!(topic = %topic, "event handler exceeded timeout, cancelled");
                    }
                }
            });
            // Best-effort bookkeeping for `stop`'s drain; a lock contended by
            // a burst of publishes just defers cleanup, it never blocks the
            // handler itself.
            if let Ok(mut guard) = inflight.try_lock() {
                guard.retain(|h| !h.is_finished());
                guard.push(join);
            }
        }
    }

    /// Drain all in-flight handler tasks, waiting at most `drain_window`.
    pub async fn stop(&self, drain_window: Duration) {
        let handles: Vec<_> = {
            let mut guard = self.inflight.lock().await;
            guard.drain(..).collect()
        };
        let drain = futures_util::future::join_all(handles);
        if tokio::time::timeout(drain_window, drain).await.is_err() {
            tracing::warn!("event bus drain window elapsed with handlers still running");
        }
    }
}
