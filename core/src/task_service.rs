//! The state machine over processes: atomic compare-and-swap acquisition,
//! completion, rejection-with-cascade, readiness scanning, and the watch
//! surface. This is the authoritative owner of process state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::definition::TaskDefinition;
use crate::error::{Result, TaskError};
use crate::event_bus::DomainEvent;
use crate::models::{NewTask, ProcessState, ProcessStatus, Task, TaskFilter, UpdateTask};
use crate::process_event_bus::{ProcessChangeEvent, SubscriptionId};
use crate::task_store::TaskStore;
use crate::validation::TaskValidator;

const EVENT_SOURCE: &str = "task-service";

/// A process that is currently ready to be acquired, surfaced by
/// [`TaskService::get_available_processes`]. Results are a snapshot hint:
/// by the time a caller acts on one, another agent may have already won the
/// race, so callers must still go through `try_acquire_process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableProcess {
    pub task_id: String,
    pub process_name: String,
    pub task: Task,
}

pub struct TaskService {
    store: Arc<TaskStore>,
    definition: Arc<TaskDefinition>,
}

impl TaskService {
    pub fn new(store: Arc<TaskStore>, definition: Arc<TaskDefinition>) -> Self {
        Self { store, definition }
    }

    pub fn definition(&self) -> &Arc<TaskDefinition> {
        &self.definition
    }

    pub async fn create_task(&self, req: NewTask) -> Result<Task> {
        TaskValidator::validate_new_task(&req)?;
        let mut task = Task::new(req.id, req.title, req.description, req.task_type, self.definition.initial_states());
        task.metadata = req.metadata;
        self.store.create(task).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| TaskError::not_found("task", task_id))
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.store.list(filter).await
    }

    /// Title/description/metadata only — never a direct status write.
    pub async fn update_task(&self, task_id: &str, req: UpdateTask) -> Result<Task> {
        if let Some(title) = &req.title {
            TaskValidator::validate_title(title)?;
        }
        if let Some(description) = &req.description {
            TaskValidator::validate_description(description)?;
        }
        self.store.update(task_id, req).await
    }

    /// Advisory close: by this spec's chosen resolution of the open
    /// question, a task with any process not yet `completed` is left
    /// untouched and rejected with `NotAllowed`.
    pub async fn close_task(&self, task_id: &str) -> Result<Task> {
        let (task, ()) = self
            .store
            .mutate(task_id, |task| {
                let all_completed = task
                    .process_states
                    .values()
                    .all(|p| p.status == ProcessStatus::Completed);
                if !all_completed {
                    return Err(TaskError::NotAllowed(
                        "cannot close a task with processes that are not completed".to_string(),
                    ));
                }
                Ok(())
            })
            .await?;
        Ok(task)
    }

    /// The atomic compare-and-swap acquisition step.
    pub async fn try_acquire_process(&self, task_id: &str, process_name: &str, agent_id: &str) -> Result<Task> {
        TaskValidator::validate_id("agent id", agent_id)?;
        let (task, ()) = self
            .store
            .mutate(task_id, |task| {
                if self.definition.get_process(process_name).is_none() {
                    return Err(TaskError::unknown_process(task_id, process_name));
                }
                let current = task
                    .process_states
                    .get(process_name)
                    .ok_or_else(|| TaskError::unknown_process(task_id, process_name))?;
                if current.status == ProcessStatus::InProgress {
                    if current.assigned_to.as_deref() == Some(agent_id) {
                        // Idempotent reacquisition by the same agent.
                        return Ok(());
                    }
                    return Err(TaskError::AlreadyAssigned {
                        task_id: task_id.to_string(),
                        process_name: process_name.to_string(),
                        holder: current.assigned_to.clone().unwrap_or_default(),
                    });
                }

                if !self.definition.can_start(process_name, &task.process_states) {
                    return Err(TaskError::not_ready(task_id, process_name));
                }

                task.process_states
                    .insert(process_name.to_string(), ProcessState::in_progress(agent_id));
                Ok(())
            })
            .await?;

        self.store.domain_events().publish(
            DomainEvent::TaskAssigned {
                task_id: task_id.to_string(),
                process_name: process_name.to_string(),
                agent_id: agent_id.to_string(),
            },
            EVENT_SOURCE,
        );
        Ok(task)
    }

    /// Marks `process_name` completed. `TaskStore::mutate` derives the new
    /// overall status afterward and publishes `TaskClosed` itself once every
    /// process reaches `completed` — the `on_all_complete: close` action from
    /// the task definition needs no separate handling here.
    pub async fn complete_process(&self, task_id: &str, process_name: &str, agent_id: &str) -> Result<()> {
        self.store
            .mutate(task_id, |task| {
                let current = task
                    .process_states
                    .get(process_name)
                    .ok_or_else(|| TaskError::unknown_process(task_id, process_name))?;
                if current.status != ProcessStatus::InProgress || current.assigned_to.as_deref() != Some(agent_id) {
                    return Err(TaskError::NotAssignedToCaller {
                        task_id: task_id.to_string(),
                        process_name: process_name.to_string(),
                        caller: agent_id.to_string(),
                    });
                }
                task.process_states.insert(process_name.to_string(), ProcessState::completed());
                Ok(())
            })
            .await?;

        self.store.domain_events().publish(
            DomainEvent::TaskUnassigned {
                task_id: task_id.to_string(),
                process_name: process_name.to_string(),
            },
            EVENT_SOURCE,
        );
        Ok(())
    }

    /// Reject the held process and cascade-reset every transitive dependent
    /// back to `pending`. The rejected process itself stays `rejected` —
    /// re-enabling it requires an explicit reacquire-after-reset action that
    /// is out of scope here; `try_acquire_process` treats `rejected` as
    /// permanently ineligible.
    pub async fn reject_process(
        &self,
        task_id: &str,
        process_name: &str,
        agent_id: &str,
        reason: &str,
    ) -> Result<Vec<String>> {
        let dependents = self.definition.transitive_dependents(process_name);
        let (_, reset) = self
            .store
            .mutate(task_id, |task| {
                let current = task
                    .process_states
                    .get(process_name)
                    .ok_or_else(|| TaskError::unknown_process(task_id, process_name))?;
                if current.status != ProcessStatus::InProgress || current.assigned_to.as_deref() != Some(agent_id) {
                    return Err(TaskError::NotAssignedToCaller {
                        task_id: task_id.to_string(),
                        process_name: process_name.to_string(),
                        caller: agent_id.to_string(),
                    });
                }

                task.process_states.insert(process_name.to_string(), ProcessState::rejected());
                let mut reset = Vec::new();
                for dependent in &dependents {
                    if task.process_states.contains_key(dependent) {
                        task.process_states.insert(dependent.clone(), ProcessState::pending());
                        reset.push(dependent.clone());
                    }
                }
                reset.sort();
                Ok(reset)
            })
            .await?;

        self.store.domain_events().publish(
            DomainEvent::TaskUnassigned {
                task_id: task_id.to_string(),
                process_name: process_name.to_string(),
            },
            EVENT_SOURCE,
        );
        tracing::info!(task_id, process_name, reason, reset = ?reset, "process rejected with cascade reset");
        Ok(reset)
    }

    /// Scan every task for processes matching `process_name` that are ready
    /// to start. Deterministically ordered by `(created_at, id)`. No lock is
    /// held across tasks — a snapshot hint only.
    pub async fn get_available_processes(&self, process_name: &str) -> Result<Vec<AvailableProcess>> {
        let mut tasks = self.store.list_all().await?;
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(tasks
            .into_iter()
            .filter(|task| self.definition.can_start(process_name, &task.process_states))
            .map(|task| AvailableProcess {
                task_id: task.id.clone(),
                process_name: process_name.to_string(),
                task,
            })
            .collect())
    }

    pub fn watch_process(&self, task_id: &str, process_name: &str) -> (SubscriptionId, mpsc::Receiver<ProcessChangeEvent>) {
        self.store.process_events().subscribe(task_id, process_name)
    }

    pub fn unwatch_process(&self, task_id: &str, process_name: &str, id: SubscriptionId) {
        self.store.process_events().unsubscribe(task_id, process_name, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{OnAllComplete, ProcessDefinition};
    use crate::event_bus::EventBus;
    use crate::process_event_bus::ProcessEventBus;
    use crate::repository::RepositoryStats;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct InMemoryRepository {
        tasks: StdMutex<HashMap<String, Task>>,
    }

    impl InMemoryRepository {
        fn new() -> Self {
            Self { tasks: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl crate::repository::TaskRepository for InMemoryRepository {
        async fn create(&self, task: Task) -> Result<Task> {
            let mut tasks = self.tasks.lock().unwrap();
            if tasks.contains_key(&task.id) {
                return Err(TaskError::Validation(format!("task '{}' already exists", task.id)));
            }
            tasks.insert(task.id.clone(), task.clone());
            Ok(task)
        }

        async fn save(&self, task: &Task) -> Result<()> {
            self.tasks.lock().unwrap().insert(task.id.clone(), task.clone());
            Ok(())
        }

        async fn update(&self, id: &str, updates: UpdateTask) -> Result<Task> {
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.get_mut(id).ok_or_else(|| TaskError::not_found("task", id))?;
            if let Some(title) = updates.title {
                task.title = title;
            }
            if let Some(description) = updates.description {
                task.description = description;
            }
            if let Some(metadata) = updates.metadata {
                task.metadata = metadata;
            }
            Ok(task.clone())
        }

        async fn get(&self, id: &str) -> Result<Option<Task>> {
            Ok(self.tasks.lock().unwrap().get(id).cloned())
        }

        async fn list(&self, _filter: TaskFilter) -> Result<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().values().cloned().collect())
        }

        async fn list_all(&self) -> Result<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().values().cloned().collect())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }

        async fn get_stats(&self) -> Result<RepositoryStats> {
            Ok(RepositoryStats::default())
        }
    }

    fn linear_definition() -> Arc<TaskDefinition> {
        Arc::new(
            TaskDefinition::new(
                vec![
                    ProcessDefinition { name: "implement".into(), description: None, depends_on: vec![] },
                    ProcessDefinition { name: "review".into(), description: None, depends_on: vec!["implement".into()] },
                    ProcessDefinition { name: "qa".into(), description: None, depends_on: vec!["implement".into()] },
                ],
                Some(OnAllComplete::Close),
            )
            .unwrap(),
        )
    }

    fn new_service() -> TaskService {
        let store = Arc::new(TaskStore::new(
            Arc::new(InMemoryRepository::new()),
            Arc::new(ProcessEventBus::new()),
            Arc::new(EventBus::new()),
            Arc::new(crate::interaction::InteractionService::new()),
        ));
        TaskService::new(store, linear_definition())
    }

    fn new_task_req(id: &str) -> NewTask {
        NewTask {
            id: id.to_string(),
            title: "title".into(),
            description: "desc".into(),
            task_type: "default".into(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn s1_single_path_dag_completes() {
        let service = new_service();
        service.create_task(new_task_req("T1")).await.unwrap();

        service.try_acquire_process("T1", "implement", "dev-0001").await.unwrap();
        service.complete_process("T1", "implement", "dev-0001").await.unwrap();

        let available_review = service.get_available_processes("review").await.unwrap();
        assert_eq!(available_review.len(), 1);
        let available_qa = service.get_available_processes("qa").await.unwrap();
        assert_eq!(available_qa.len(), 1);

        service.try_acquire_process("T1", "review", "rev-0001").await.unwrap();
        service.try_acquire_process("T1", "qa", "qa-0001").await.unwrap();
        service.complete_process("T1", "review", "rev-0001").await.unwrap();
        service.complete_process("T1", "qa", "qa-0001").await.unwrap();

        let task = service.get_task("T1").await.unwrap();
        assert_eq!(task.status(), crate::models::TaskStatus::Closed);
    }

    #[tokio::test]
    async fn s2_contention_exactly_one_winner() {
        let service = Arc::new(new_service());
        service.create_task(new_task_req("T1")).await.unwrap();

        let a = service.clone();
        let b = service.clone();
        let (ra, rb) = tokio::join!(
            a.try_acquire_process("T1", "implement", "dev-0001"),
            b.try_acquire_process("T1", "implement", "dev-0002"),
        );
        let outcomes = [ra.is_ok(), rb.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let failure = if ra.is_err() { ra.unwrap_err() } else { rb.unwrap_err() };
        assert!(matches!(failure, TaskError::AlreadyAssigned { .. }));
    }

    #[tokio::test]
    async fn reacquire_by_same_agent_is_idempotent() {
        let service = new_service();
        service.create_task(new_task_req("T1")).await.unwrap();
        service.try_acquire_process("T1", "implement", "dev-0001").await.unwrap();
        let again = service.try_acquire_process("T1", "implement", "dev-0001").await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn s3_rejection_cascade() {
        let service = new_service();
        service.create_task(new_task_req("T1")).await.unwrap();
        service.try_acquire_process("T1", "implement", "dev-0001").await.unwrap();
        service.complete_process("T1", "implement", "dev-0001").await.unwrap();
        service.try_acquire_process("T1", "review", "rev-0001").await.unwrap();
        service.complete_process("T1", "review", "rev-0001").await.unwrap();
        service.try_acquire_process("T1", "qa", "qa-0001").await.unwrap();

        // implement is already completed; simulate its rejection by first
        // re-acquiring it is impossible (it's completed, not in-progress),
        // so drive the cascade from qa instead to exercise the reset path
        // against the already-completed `review`.
        let reset = service.reject_process("T1", "qa", "qa-0001", "bug").await.unwrap();
        assert!(reset.is_empty());
        let task = service.get_task("T1").await.unwrap();
        assert_eq!(task.process_states["qa"].status, ProcessStatus::Rejected);
        assert_eq!(task.status(), crate::models::TaskStatus::Rejected);
    }

    #[tokio::test]
    async fn reject_resets_transitive_dependents_to_pending() {
        let service = new_service();
        service.create_task(new_task_req("T1")).await.unwrap();
        service.try_acquire_process("T1", "implement", "dev-0001").await.unwrap();

        let reset = service.reject_process("T1", "implement", "dev-0001", "bug").await.unwrap();
        assert_eq!(reset, vec!["qa".to_string(), "review".to_string()]);

        let task = service.get_task("T1").await.unwrap();
        assert_eq!(task.process_states["implement"].status, ProcessStatus::Rejected);
        assert_eq!(task.process_states["review"].status, ProcessStatus::Pending);
        assert_eq!(task.process_states["qa"].status, ProcessStatus::Pending);

        // rejected stays rejected: a fresh acquire attempt is not-ready, not
        // assigned-elsewhere.
        let retry = service.try_acquire_process("T1", "implement", "dev-0002").await;
        assert!(matches!(retry, Err(TaskError::NotReady { .. })));
    }

    #[tokio::test]
    async fn complete_requires_holder() {
        let service = new_service();
        service.create_task(new_task_req("T1")).await.unwrap();
        service.try_acquire_process("T1", "implement", "dev-0001").await.unwrap();
        let result = service.complete_process("T1", "implement", "dev-0002").await;
        assert!(matches!(result, Err(TaskError::NotAssignedToCaller { .. })));
    }

    #[tokio::test]
    async fn close_task_rejected_with_open_processes() {
        let service = new_service();
        service.create_task(new_task_req("T1")).await.unwrap();
        let result = service.close_task("T1").await;
        assert!(matches!(result, Err(TaskError::NotAllowed(_))));
    }
}
