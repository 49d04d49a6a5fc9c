//! Mediates every mutation of a [`crate::models::Task`], enforcing that
//! concurrent writers to the same task serialize while writers to distinct
//! tasks proceed in parallel, and that every committed mutation is
//! reflected on both event buses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::Result;
use crate::event_bus::{DomainEvent, EventBus};
use crate::interaction::InteractionService;
use crate::models::{Task, TaskFilter, UpdateTask};
use crate::process_event_bus::{ProcessChangeEvent, ProcessEventBus};
use crate::repository::TaskRepository;

const EVENT_SOURCE: &str = "task-store";

/// Per-task single-writer gate plus the commit/publish pipeline shared by
/// every `TaskService` operation.
pub struct TaskStore {
    repository: Arc<dyn TaskRepository>,
    process_events: Arc<ProcessEventBus>,
    domain_events: Arc<EventBus>,
    interactions: Arc<InteractionService>,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TaskStore {
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        process_events: Arc<ProcessEventBus>,
        domain_events: Arc<EventBus>,
        interactions: Arc<InteractionService>,
    ) -> Self {
        Self {
            repository,
            process_events,
            domain_events,
            interactions,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, task_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the per-task serialization lock. Held by the caller for the
    /// duration of a full read-modify-write cycle.
    pub async fn acquire(&self, task_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(task_id).lock_owned().await
    }

    pub async fn create(&self, task: Task) -> Result<Task> {
        let _guard = self.acquire(&task.id).await;
        let task = self.repository.create(task).await?;
        self.domain_events.publish(
            DomainEvent::TaskCreated { task_id: task.id.clone() },
            EVENT_SOURCE,
        );
        Ok(task)
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        self.repository.get(task_id).await
    }

    pub async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.repository.list(filter).await
    }

    pub async fn list_all(&self) -> Result<Vec<Task>> {
        self.repository.list_all().await
    }

    pub async fn update(&self, task_id: &str, updates: UpdateTask) -> Result<Task> {
        let _guard = self.acquire(task_id).await;
        self.repository.update(task_id, updates).await
    }

    /// Run `mutate` against the current task under the task's serialization
    /// lock, commit the result, and publish a [`ProcessChangeEvent`] for
    /// every process whose status changed plus the corresponding domain
    /// events. Publish failures are logged, never rolled back — the mutation
    /// already committed.
    pub async fn mutate<F, R>(&self, task_id: &str, mutate: F) -> Result<(Task, R)>
    where
        F: FnOnce(&mut Task) -> Result<R>,
    {
        let _guard = self.acquire(task_id).await;
        let mut task = self
            .repository
            .get(task_id)
            .await?
            .ok_or_else(|| crate::error::TaskError::not_found("task", task_id))?;
        let before = task.process_states.clone();
        let before_status = task.status();

        let result = mutate(&mut task)?;
        task.updated_at = chrono::Utc::now();
        self.repository.save(&task).await?;

        self.publish_process_changes(&task, &before);
        self.publish_status_change(&task, before_status);

        Ok((task, result))
    }

    fn publish_process_changes(&self, task: &Task, before: &HashMap<String, crate::models::ProcessState>) {
        for (name, after_state) in &task.process_states {
            let Some(before_state) = before.get(name) else {
                continue;
            };
            if before_state.status != after_state.status {
                self.process_events.publish(ProcessChangeEvent {
                    task_id: task.id.clone(),
                    process_name: name.clone(),
                    old_status: before_state.status,
                    new_status: after_state.status,
                    changed_by: after_state.assigned_to.clone().or_else(|| before_state.assigned_to.clone()),
                    at: task.updated_at,
                });
            }
        }
    }

    fn publish_status_change(&self, task: &Task, before_status: crate::models::TaskStatus) {
        let after_status = task.status();
        if after_status != before_status {
            self.domain_events.publish(
                DomainEvent::TaskStatusChanged {
                    task_id: task.id.clone(),
                    old_status: before_status,
                    new_status: after_status,
                },
                EVENT_SOURCE,
            );
            if after_status == crate::models::TaskStatus::Closed {
                self.domain_events.publish(
                    DomainEvent::TaskClosed { task_id: task.id.clone() },
                    EVENT_SOURCE,
                );
            }
            if matches!(after_status, crate::models::TaskStatus::Closed | crate::models::TaskStatus::Rejected) {
                self.interactions.expire_all_for_task(&task.id);
            }
        }
    }

    pub fn process_events(&self) -> &Arc<ProcessEventBus> {
        &self.process_events
    }

    pub fn domain_events(&self) -> &Arc<EventBus> {
        &self.domain_events
    }
}
