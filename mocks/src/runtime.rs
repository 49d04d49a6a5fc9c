//! Mock implementations of [`AgentRuntime`] and [`WorktreeManager`] for
//! exercising [`task_core::agent::Agent`] end-to-end without a real AI CLI
//! or git checkout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use task_core::runtime::{AgentRuntime, AgentRuntimeFactory, ExecutionOutcome, PermissionCallback, WorkItem, WorktreeManager};
use task_core::{Result, TaskError};

/// Mints [`MockAgentRuntime`] instances that all report call history to the
/// same shared log and resolve `execute` with the same scripted outcome.
pub struct MockAgentRuntimeFactory {
    outcome: ExecutionOutcome,
    busy_for: Duration,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockAgentRuntimeFactory {
    pub fn new(outcome: ExecutionOutcome) -> Self {
        Self { outcome, busy_for: Duration::ZERO, call_history: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Make every created runtime's `execute` sleep for `busy_for` before
    /// resolving, for exercising preemption/cancellation races.
    pub fn with_busy_for(mut self, busy_for: Duration) -> Self {
        self.busy_for = busy_for;
        self
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }
}

impl AgentRuntimeFactory for MockAgentRuntimeFactory {
    fn create(&self) -> Box<dyn AgentRuntime> {
        Box::new(MockAgentRuntime {
            outcome: self.outcome.clone(),
            busy_for: self.busy_for,
            call_history: self.call_history.clone(),
        })
    }
}

/// Mock [`AgentRuntime`] that connects and disconnects instantly and
/// resolves `execute` with a scripted [`ExecutionOutcome`].
pub struct MockAgentRuntime {
    outcome: ExecutionOutcome,
    busy_for: Duration,
    call_history: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl AgentRuntime for MockAgentRuntime {
    async fn connect(&mut self) -> Result<()> {
        self.call_history.lock().push("connect".to_string());
        Ok(())
    }

    async fn execute(&mut self, work: WorkItem, _on_permission: &PermissionCallback) -> Result<ExecutionOutcome> {
        self.call_history.lock().push(format!("execute({})", work.task_id));
        if !self.busy_for.is_zero() {
            tokio::time::sleep(self.busy_for).await;
        }
        Ok(self.outcome.clone())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.call_history.lock().push("disconnect".to_string());
        Ok(())
    }
}

/// Mock [`WorktreeManager`] that hands out a deterministic path per task
/// instead of shelling out to git, with call tracking and error injection.
pub struct MockWorktreeManager {
    provisioned: Arc<Mutex<Vec<String>>>,
    released: Arc<Mutex<Vec<String>>>,
    error_injection: Arc<Mutex<Option<TaskError>>>,
}

impl Default for MockWorktreeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorktreeManager {
    pub fn new() -> Self {
        Self {
            provisioned: Arc::new(Mutex::new(Vec::new())),
            released: Arc::new(Mutex::new(Vec::new())),
            error_injection: Arc::new(Mutex::new(None)),
        }
    }

    /// Inject an error to be returned by the next `provision` call.
    pub fn inject_error(&self, error: TaskError) {
        *self.error_injection.lock() = Some(error);
    }

    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned.lock().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }
}

#[async_trait]
impl WorktreeManager for MockWorktreeManager {
    async fn provision(&self, task_id: &str) -> Result<String> {
        if let Some(error) = self.error_injection.lock().take() {
            return Err(error);
        }
        self.provisioned.lock().push(task_id.to_string());
        Ok(format!("/tmp/mock-worktree/{task_id}"))
    }

    async fn release(&self, task_id: &str, _worktree_path: &str) -> Result<()> {
        self.released.lock().push(task_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_core::agent::{Agent, PermissionMode, PermissionPolicy};
    use task_core::event_bus::EventBus;
    use task_core::interaction::InteractionService;
    use task_core::process_event_bus::ProcessEventBus;
    use task_core::task_service::TaskService;
    use task_core::task_store::TaskStore;
    use task_core::{NewTask, OnAllComplete, ProcessDefinition, TaskDefinition};
    use tokio_util::sync::CancellationToken;

    fn task_service() -> Arc<TaskService> {
        let store = Arc::new(TaskStore::new(
            Arc::new(crate::MockTaskRepository::new()),
            Arc::new(ProcessEventBus::new()),
            Arc::new(EventBus::new()),
            Arc::new(InteractionService::new()),
        ));
        let definition = Arc::new(
            TaskDefinition::new(
                vec![ProcessDefinition { name: "implement".into(), description: None, depends_on: vec![] }],
                Some(OnAllComplete::Close),
            )
            .unwrap(),
        );
        Arc::new(TaskService::new(store, definition))
    }

    #[tokio::test]
    async fn agent_completes_a_real_task_against_mocked_collaborators() {
        let tasks = task_service();
        tasks
            .create_task(NewTask { id: "T1".into(), title: "t".into(), description: "d".into(), task_type: "feature".into(), metadata: Default::default() })
            .await
            .unwrap();

        let runtime_factory = Arc::new(MockAgentRuntimeFactory::new(ExecutionOutcome::CompleteProcess));
        let worktree = Arc::new(MockWorktreeManager::new());

        let (agent, _rx) = Agent::new(
            "dev-0001".into(),
            "dev".into(),
            "implement".into(),
            "do the work".into(),
            None,
            runtime_factory.clone(),
            worktree.clone(),
            tasks.clone(),
            Arc::new(InteractionService::new()),
            Arc::new(EventBus::new()),
            PermissionPolicy { mode: PermissionMode::BypassPermissions, ..Default::default() },
        );

        let cancel = CancellationToken::new();
        let agent_cancel = cancel.clone();
        let handle = tokio::spawn(async move { agent.run(agent_cancel).await });

        let task = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let task = tasks.get_task("T1").await.unwrap();
                if task.status() == task_core::TaskStatus::Closed {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("agent did not complete the task within the timeout");

        assert_eq!(task.status(), task_core::TaskStatus::Closed);
        assert_eq!(worktree.provisioned(), vec!["T1".to_string()]);
        assert_eq!(worktree.released(), vec!["T1".to_string()]);
        assert!(runtime_factory.call_history().contains(&"disconnect".to_string()));

        cancel.cancel();
        handle.await.unwrap();
    }
}
