//! SQLite-backed [`TaskRepository`] for the task-orchestration daemon.
//!
//! Tasks are stored one row per ID with an opaque JSON `data` column holding
//! the task's complete serialization — process states, metadata, everything
//! — alongside a couple of indexed columns (`task_type`, `created_at`) used
//! to push cheap pre-filtering into SQL before `TaskFilter` is applied in
//! memory. See [`SqliteTaskRepository`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use database::SqliteTaskRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = SqliteTaskRepository::new(":memory:").await?;
//!     repo.migrate().await?;
//!     repo.health_check().await?;
//!     Ok(())
//! }
//! ```

mod common;
mod sqlite;

pub use sqlite::SqliteTaskRepository;

pub use task_core::{
    repository::{RepositoryStats, TaskRepository},
    NewTask, ProcessState, Result, Task, TaskError, TaskFilter, TaskStatus, UpdateTask,
};
