use crate::{
    error::Result,
    models::{Task, TaskFilter, UpdateTask},
};
use async_trait::async_trait;

/// Durable persistence of [`Task`] records.
///
/// The core treats this as an opaque collaborator: a single blob holds each
/// task's full process-state map and metadata, tolerating unknown fields for
/// forward compatibility. Implementations must be thread-safe; the
/// [`crate::task_store::TaskStore`] is the only caller and already serializes
/// concurrent mutations of the same task ID, so a repository need not provide
/// its own per-row locking beyond what its storage engine requires.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Persist a fully-formed task (its process states already populated
    /// from the active `TaskDefinition` by the caller). Fails with
    /// `Validation` if a task with the same ID already exists.
    async fn create(&self, task: Task) -> Result<Task>;

    /// Persist a task whose process states were already mutated in memory by
    /// the caller (the `TaskService` CAS machine). This is the only path by
    /// which process states change on disk.
    async fn save(&self, task: &Task) -> Result<()>;

    /// Apply a title/description/metadata patch. Never touches process
    /// states.
    async fn update(&self, id: &str, updates: UpdateTask) -> Result<Task>;

    async fn get(&self, id: &str) -> Result<Option<Task>>;

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    /// Snapshot of every task, used by `GetAvailableProcesses` to scan for
    /// ready work. No lock is held across the scan; callers must re-check via
    /// `TryAcquireProcess`.
    async fn list_all(&self) -> Result<Vec<Task>>;

    async fn health_check(&self) -> Result<()>;

    async fn get_stats(&self) -> Result<RepositoryStats>;
}

/// Repository statistics for monitoring and health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepositoryStats {
    pub total_tasks: u64,
    pub closed_tasks: u64,
    pub rejected_tasks: u64,
    pub latest_created: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_stats_default_is_zeroed() {
        let stats = RepositoryStats::default();
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.closed_tasks, 0);
        assert!(stats.latest_created.is_none());
    }
}
