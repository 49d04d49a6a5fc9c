use sqlx::{sqlite::SqliteRow, Row};
use task_core::{Task, TaskError, Result};

/// Deserialize the opaque `data` column back into a [`Task`]. Unknown fields
/// are tolerated by `serde`'s default behavior, which is what lets the daemon
/// roll forward across schema additions without a migration.
pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let data: String = row.get("data");
    serde_json::from_str(&data)
        .map_err(|e| TaskError::Internal(format!("corrupt task record: {e}")))
}

/// Map a `sqlx` failure onto the core error taxonomy. Unique-constraint
/// violations are handled by callers before this is reached, since only they
/// know which field collided.
pub fn sqlx_error_to_task_error(err: sqlx::Error) -> TaskError {
    match &err {
        sqlx::Error::RowNotFound => TaskError::Internal("unexpected RowNotFound".to_string()),
        sqlx::Error::PoolTimedOut => TaskError::Internal("database connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => TaskError::Internal(format!("database I/O error: {io_err}")),
        _ => TaskError::Internal(format!("database operation failed: {err}")),
    }
}
