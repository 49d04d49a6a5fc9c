//! Keyed, best-effort pub/sub of process-status transitions.
//!
//! Subscribers register on `(task_id, process_name)` or the task-wide
//! wildcard `(task_id, "*")` and receive a bounded sink. Delivery never
//! blocks the publisher: a full sink simply drops the event for that
//! subscriber, on the assumption that the subscriber re-reads authoritative
//! state on wake. There is no replay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::ProcessStatus;

pub const WILDCARD: &str = "*";

/// One structural transition of a single process, published exactly once per
/// committed mutation of that process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessChangeEvent {
    pub task_id: String,
    pub process_name: String,
    pub old_status: ProcessStatus,
    pub new_status: ProcessStatus,
    pub changed_by: Option<String>,
    pub at: DateTime<Utc>,
}

/// Opaque handle returned by [`ProcessEventBus::subscribe`]; pass it back to
/// [`ProcessEventBus::unsubscribe`] to release the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

const SINK_CAPACITY: usize = 64;

struct Subscriber {
    id: SubscriptionId,
    sender: mpsc::Sender<ProcessChangeEvent>,
}

#[derive(Default)]
pub struct ProcessEventBus {
    next_id: AtomicU64,
    subscribers: StdMutex<HashMap<(String, String), Vec<Subscriber>>>,
}

impl ProcessEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes of `process_name` on `task_id`, or pass
    /// [`WILDCARD`] to receive every process under the task.
    pub fn subscribe(&self, task_id: &str, process_name: &str) -> (SubscriptionId, mpsc::Receiver<ProcessChangeEvent>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        let key = (task_id.to_string(), process_name.to_string());
        self.subscribers
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(Subscriber { id, sender: tx });
        (id, rx)
    }

    /// Releases the sink registered under `task_id`/`process_name` for `id`.
    /// Safe to call more than once; the second call is a no-op.
    pub fn unsubscribe(&self, task_id: &str, process_name: &str, id: SubscriptionId) {
        let key = (task_id.to_string(), process_name.to_string());
        let mut subs = self.subscribers.lock().unwrap();
        if let Some(list) = subs.get_mut(&key) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subs.remove(&key);
            }
        }
    }

    /// Deliver `event` to every subscriber keyed on its exact process and to
    /// every task-wide wildcard subscriber. Non-blocking: a full sink drops
    /// the event for that subscriber only.
    pub fn publish(&self, event: ProcessChangeEvent) {
        let subs = self.subscribers.lock().unwrap();
        if let Some(list) = subs.get(&(event.task_id.clone(), event.process_name.clone())) {
            for sub in list {
                if sub.sender.try_send(event.clone()).is_err() {
                    tracing::debug!(
                        task_id = %event.task_id,
                        process_name = %event.process_name,
                        "process event sink full or closed, dropping event"
                    );
                }
            }
        }
        if let Some(list) = subs.get(&(event.task_id.clone(), WILDCARD.to_string())) {
            for sub in list {
                if sub.sender.try_send(event.clone()).is_err() {
                    tracing::debug!(
                        task_id = %event.task_id,
                        process_name = %event.process_name,
                        "wildcard process event sink full or closed, dropping event"
                    );
                }
            }
        }
    }

    /// Drop every registered sink, closing all subscriber channels.
    pub fn close(&self) {
        self.subscribers.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(task_id: &str, process_name: &str, old: ProcessStatus, new: ProcessStatus) -> ProcessChangeEvent {
        ProcessChangeEvent {
            task_id: task_id.to_string(),
            process_name: process_name.to_string(),
            old_status: old,
            new_status: new,
            changed_by: Some("dev-0001".to_string()),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn keyed_subscriber_receives_matching_event_only() {
        let bus = ProcessEventBus::new();
        let (_id, mut rx) = bus.subscribe("T1", "implement");
        bus.publish(event("T1", "review", ProcessStatus::Pending, ProcessStatus::InProgress));
        bus.publish(event("T1", "implement", ProcessStatus::Pending, ProcessStatus::InProgress));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.process_name, "implement");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn wildcard_subscriber_receives_every_process() {
        let bus = ProcessEventBus::new();
        let (_id, mut rx) = bus.subscribe("T1", WILDCARD);
        bus.publish(event("T1", "implement", ProcessStatus::Pending, ProcessStatus::InProgress));
        bus.publish(event("T1", "review", ProcessStatus::Pending, ProcessStatus::InProgress));

        assert_eq!(rx.recv().await.unwrap().process_name, "implement");
        assert_eq!(rx.recv().await.unwrap().process_name, "review");
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = ProcessEventBus::new();
        let (id, mut rx) = bus.subscribe("T1", "implement");
        bus.unsubscribe("T1", "implement", id);
        bus.publish(event("T1", "implement", ProcessStatus::Pending, ProcessStatus::InProgress));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_sink_drops_event_without_blocking() {
        let bus = ProcessEventBus::new();
        let (_id, _rx) = bus.subscribe("T1", "implement");
        for _ in 0..(SINK_CAPACITY + 10) {
            bus.publish(event("T1", "implement", ProcessStatus::Pending, ProcessStatus::InProgress));
        }
        // Publishing past capacity must not panic or block; the test
        // completing at all is the assertion.
    }
}
