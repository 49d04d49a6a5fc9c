//! Mock implementation of [`TaskRepository`].
//!
//! Provides a thread-safe in-memory repository with error injection and call
//! tracking for exercising callers without a real database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use task_core::{RepositoryStats, Result, Task, TaskError, TaskFilter, TaskRepository, TaskStatus, UpdateTask};

/// Mock implementation of [`TaskRepository`] for testing.
///
/// Features:
/// - Thread-safe concurrent access
/// - Error injection for failure-path testing
/// - Call history tracking for verification
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    error_injection: Arc<Mutex<Option<TaskError>>>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl Default for MockTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            error_injection: Arc::new(Mutex::new(None)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock repository pre-populated with the given tasks.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let task_map = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            tasks: Arc::new(Mutex::new(task_map)),
            error_injection: Arc::new(Mutex::new(None)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Inject an error to be returned by the next call.
    pub fn inject_error(&self, error: TaskError) {
        *self.error_injection.lock() = Some(error);
    }

    pub fn clear_error(&self) {
        *self.error_injection.lock() = None;
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.call_history.lock().clear();
    }

    /// Assert a method was called at least once.
    pub fn assert_called(&self, method: &str) {
        let history = self.call_history.lock();
        assert!(
            history.iter().any(|call| call.contains(method)),
            "Method '{}' was not called. Call history: {:?}",
            method,
            *history
        );
    }

    fn check_error_injection(&self) -> Result<()> {
        let mut error_opt = self.error_injection.lock();
        if let Some(error) = error_opt.take() {
            return Err(error);
        }
        Ok(())
    }

    fn record_call(&self, method: &str) {
        self.call_history.lock().push(format!("{method}()"));
    }

    fn record_call_with_params(&self, method: &str, params: &str) {
        self.call_history.lock().push(format!("{method}({params})"));
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, task: Task) -> Result<Task> {
        self.record_call_with_params("create", &format!("id={}", task.id));
        self.check_error_injection()?;

        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&task.id) {
            return Err(TaskError::Validation(format!("task '{}' already exists", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn save(&self, task: &Task) -> Result<()> {
        self.record_call_with_params("save", &format!("id={}", task.id));
        self.check_error_injection()?;

        let mut tasks = self.tasks.lock();
        if !tasks.contains_key(&task.id) {
            return Err(TaskError::not_found("task", &task.id));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn update(&self, id: &str, updates: UpdateTask) -> Result<Task> {
        self.record_call_with_params("update", &format!("id={id}"));
        self.check_error_injection()?;

        let mut tasks = self.tasks.lock();
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
        task.updated_at = Utc::now();

        Ok(task.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        self.record_call_with_params("get", &format!("id={id}"));
        self.check_error_injection()?;

        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.record_call("list");
        self.check_error_injection()?;

        let tasks = self.tasks.lock();
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|task| {
                if let Some(ref task_type) = filter.task_type {
                    if task.task_type != *task_type {
                        return false;
                    }
                }
                if let Some(status) = filter.status {
                    if task.status() != status {
                        return false;
                    }
                }
                if let Some(created_after) = filter.created_after {
                    if task.created_at < created_after {
                        return false;
                    }
                }
                if let Some(created_before) = filter.created_before {
                    if task.created_at > created_before {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(offset) = filter.offset {
            if offset as usize >= result.len() {
                return Ok(Vec::new());
            }
            result = result.into_iter().skip(offset as usize).collect();
        }
        if let Some(limit) = filter.limit {
            result.truncate(limit as usize);
        }

        Ok(result)
    }

    async fn list_all(&self) -> Result<Vec<Task>> {
        self.record_call("list_all");
        self.check_error_injection()?;

        Ok(self.tasks.lock().values().cloned().collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.record_call("health_check");
        self.check_error_injection()?;
        Ok(())
    }

    async fn get_stats(&self) -> Result<RepositoryStats> {
        self.record_call("get_stats");
        self.check_error_injection()?;

        let tasks = self.tasks.lock();
        let mut stats = RepositoryStats { total_tasks: tasks.len() as u64, ..Default::default() };
        for task in tasks.values() {
            match task.status() {
                TaskStatus::Closed => stats.closed_tasks += 1,
                TaskStatus::Rejected => stats.rejected_tasks += 1,
                TaskStatus::Pending | TaskStatus::InProgress => {}
            }
            stats.latest_created = Some(match stats.latest_created {
                Some(latest) if latest >= task.created_at => latest,
                _ => task.created_at,
            });
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::sample_task;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = MockTaskRepository::new();
        let created = repo.create(sample_task("T1", "feature")).await.unwrap();
        let fetched = repo.get("T1").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn create_duplicate_id_is_validation_error() {
        let repo = MockTaskRepository::new();
        repo.create(sample_task("T1", "feature")).await.unwrap();
        let result = repo.create(sample_task("T1", "feature")).await;
        assert!(matches!(result, Err(TaskError::Validation(_))));
    }

    #[tokio::test]
    async fn error_injection_surfaces_on_next_call_only() {
        let repo = MockTaskRepository::new();
        repo.inject_error(TaskError::Internal("boom".to_string()));
        assert!(repo.get("T1").await.is_err());
        assert!(repo.get("T1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn call_history_tracks_invocations() {
        let repo = MockTaskRepository::new();
        repo.create(sample_task("T1", "feature")).await.unwrap();
        repo.get("T1").await.unwrap();
        repo.assert_called("create");
        repo.assert_called("get");
    }

    #[tokio::test]
    async fn list_filters_by_task_type() {
        let repo = MockTaskRepository::new();
        repo.create(sample_task("T1", "feature")).await.unwrap();
        repo.create(sample_task("T2", "bugfix")).await.unwrap();

        let features = repo.list(TaskFilter { task_type: Some("feature".to_string()), ..Default::default() }).await.unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id, "T1");
    }
}
