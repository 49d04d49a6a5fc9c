use crate::common::{row_to_task, sqlx_error_to_task_error};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use task_core::repository::{RepositoryStats, TaskRepository};
use task_core::{Result, Task, TaskError, TaskFilter, TaskStatus, UpdateTask};

/// SQLite-backed [`TaskRepository`].
///
/// Each task is stored as one row: a handful of indexed columns
/// (`task_type`, `created_at`) for cheap pre-filtering, plus an opaque `data`
/// column holding the task's full JSON serialization — process states,
/// metadata, everything. Reads decode that blob directly; the indexed
/// columns never drift from it because every write re-derives them from the
/// same `Task` value.
#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    /// Connect to `database_url` (a file path or `:memory:`), creating the
    /// database file if it does not already exist.
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_url = if database_url.starts_with(":memory:") || database_url.starts_with("sqlite://") {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url)
                .await
                .map_err(|e| TaskError::Internal(format!("failed to create database: {e}")))?;
        }

        let connect_options = if db_url.contains(":memory:") {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_url)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        } else {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        };

        let pool = SqlitePool::connect_with(connect_options)
            .await
            .map_err(sqlx_error_to_task_error)?;

        Ok(Self { pool })
    }

    /// Apply pending migrations. Must be called once after `new` before the
    /// repository is used.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| TaskError::Internal(format!("migration failed: {e}")))?;
        tracing::info!("database migrations completed");
        Ok(())
    }

    /// Access to the underlying pool, for tests that need raw SQL.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: Task) -> Result<Task> {
        let data = serde_json::to_string(&task)
            .map_err(|e| TaskError::Internal(format!("failed to serialize task: {e}")))?;

        let result = sqlx::query("INSERT INTO tasks (id, task_type, created_at, data) VALUES (?, ?, ?, ?)")
            .bind(&task.id)
            .bind(&task.task_type)
            .bind(task.created_at)
            .bind(&data)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(task),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(TaskError::Validation(format!("task '{}' already exists", task.id)))
            }
            Err(e) => Err(sqlx_error_to_task_error(e)),
        }
    }

    async fn save(&self, task: &Task) -> Result<()> {
        let data = serde_json::to_string(task)
            .map_err(|e| TaskError::Internal(format!("failed to serialize task: {e}")))?;

        let result = sqlx::query("UPDATE tasks SET task_type = ?, created_at = ?, data = ? WHERE id = ?")
            .bind(&task.task_type)
            .bind(task.created_at)
            .bind(&data)
            .bind(&task.id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;

        if result.rows_affected() == 0 {
            return Err(TaskError::not_found("task", &task.id));
        }
        Ok(())
    }

    async fn update(&self, id: &str, updates: UpdateTask) -> Result<Task> {
        let mut task = self.get(id).await?.ok_or_else(|| TaskError::not_found("task", id))?;

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

        self.save(&task).await?;
        Ok(task)
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT data FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        // `task_type` and the created_at window are indexed columns we can
        // push into SQL; `status` is derived, so it's applied after decoding.
        let mut query_builder: sqlx::QueryBuilder<sqlx::Sqlite> =
            sqlx::QueryBuilder::new("SELECT data FROM tasks");
        let mut has_conditions = false;

        if let Some(ref task_type) = filter.task_type {
            query_builder.push(" WHERE task_type = ");
            query_builder.push_bind(task_type);
            has_conditions = true;
        }
        if let Some(created_after) = filter.created_after {
            query_builder.push(if has_conditions { " AND created_at >= " } else { " WHERE created_at >= " });
            query_builder.push_bind(created_after);
            has_conditions = true;
        }
        if let Some(created_before) = filter.created_before {
            query_builder.push(if has_conditions { " AND created_at <= " } else { " WHERE created_at <= " });
            query_builder.push_bind(created_before);
        }
        query_builder.push(" ORDER BY created_at DESC");

        let rows = query_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;

        let mut tasks: Vec<Task> = rows.iter().map(row_to_task).collect::<Result<_>>()?;

        if let Some(status) = filter.status {
            tasks.retain(|t| t.status() == status);
        }

        if let Some(offset) = filter.offset {
            tasks.drain(..tasks.len().min(offset as usize));
        }
        if let Some(limit) = filter.limit {
            tasks.truncate(limit as usize);
        }

        Ok(tasks)
    }

    async fn list_all(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT data FROM tasks")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;

        rows.iter().map(row_to_task).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        Ok(())
    }

    async fn get_stats(&self) -> Result<RepositoryStats> {
        let tasks = self.list_all().await?;

        let mut stats = RepositoryStats { total_tasks: tasks.len() as u64, ..Default::default() };
        for task in &tasks {
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
    use std::collections::HashMap;
    use task_core::ProcessState;

    async fn test_repository() -> SqliteTaskRepository {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let thread_id = std::thread::current().id();
        let db_name = format!(":memory:test_{timestamp}_{thread_id:?}");
        let repo = SqliteTaskRepository::new(&db_name).await.unwrap();
        repo.migrate().await.unwrap();
        repo
    }

    fn task(id: &str, task_type: &str) -> Task {
        let mut states = HashMap::new();
        states.insert("implement".to_string(), ProcessState::pending());
        Task::new(id.to_string(), "title".to_string(), "desc".to_string(), task_type.to_string(), states)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = test_repository().await;
        let created = repo.create(task("T1", "feature")).await.unwrap();
        let fetched = repo.get("T1").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.process_states.len(), 1);
    }

    #[tokio::test]
    async fn create_duplicate_id_is_validation_error() {
        let repo = test_repository().await;
        repo.create(task("T1", "feature")).await.unwrap();
        let result = repo.create(task("T1", "feature")).await;
        assert!(matches!(result, Err(TaskError::Validation(_))));
    }

    #[tokio::test]
    async fn save_persists_mutated_process_states() {
        let repo = test_repository().await;
        let mut created = repo.create(task("T1", "feature")).await.unwrap();
        created.process_states.insert("implement".to_string(), ProcessState::in_progress("dev-0001"));
        repo.save(&created).await.unwrap();

        let fetched = repo.get("T1").await.unwrap().unwrap();
        assert_eq!(fetched.status(), TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn save_unknown_task_is_not_found() {
        let repo = test_repository().await;
        let result = repo.save(&task("ghost", "feature")).await;
        assert!(matches!(result, Err(TaskError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_patches_title_without_touching_process_states() {
        let repo = test_repository().await;
        repo.create(task("T1", "feature")).await.unwrap();

        let updated = repo
            .update("T1", UpdateTask { title: Some("new title".to_string()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.title, "new title");
        assert_eq!(updated.process_states.len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_task_type_and_status() {
        let repo = test_repository().await;
        repo.create(task("T1", "feature")).await.unwrap();
        repo.create(task("T2", "bugfix")).await.unwrap();

        let mut rejected = task("T3", "feature");
        rejected.process_states.insert("implement".to_string(), ProcessState::rejected());
        repo.create(rejected).await.unwrap();

        let features = repo.list(TaskFilter { task_type: Some("feature".to_string()), ..Default::default() }).await.unwrap();
        assert_eq!(features.len(), 2);

        let pending_only = repo
            .list(TaskFilter { task_type: Some("feature".to_string()), status: Some(TaskStatus::Pending), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].id, "T1");
    }

    #[tokio::test]
    async fn list_respects_limit_and_offset() {
        let repo = test_repository().await;
        for i in 0..5 {
            repo.create(task(&format!("T{i}"), "feature")).await.unwrap();
        }

        let page = repo.list(TaskFilter { limit: Some(2), offset: Some(1), ..Default::default() }).await.unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn get_stats_counts_by_derived_status() {
        let repo = test_repository().await;
        repo.create(task("T1", "feature")).await.unwrap();

        let mut closed = task("T2", "feature");
        closed.process_states.insert("implement".to_string(), ProcessState::completed());
        repo.create(closed).await.unwrap();

        let stats = repo.get_stats().await.unwrap();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.closed_tasks, 1);
        assert!(stats.latest_created.is_some());
    }

    #[tokio::test]
    async fn forward_compatible_with_unknown_fields() {
        let repo = test_repository().await;
        let now = Utc::now();
        let data = format!(
            r#"{{"id":"T1","title":"t","description":"d","task_type":"feature","created_at":"{now}","updated_at":"{now}","metadata":{{}},"process_states":{{}},"future_field":"ignored"}}"#
        );
        sqlx::query("INSERT INTO tasks (id, task_type, created_at, data) VALUES (?, ?, ?, ?)")
            .bind("T1")
            .bind("feature")
            .bind(now)
            .bind(&data)
            .execute(repo.pool())
            .await
            .unwrap();

        let fetched = repo.get("T1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "T1");
    }
}
