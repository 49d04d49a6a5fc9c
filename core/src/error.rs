use thiserror::Error;

/// Result type alias used throughout the orchestration core.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Error taxonomy for the task-orchestration core.
///
/// Each variant maps to a stable RPC status at the transport edge; see
/// [`TaskError::status_code`].
///
/// # Examples
///
/// ```rust
/// use task_core::error::TaskError;
///
/// let not_found = TaskError::not_found("task", "T-42");
/// assert!(not_found.is_not_found());
/// assert_eq!(not_found.status_code(), 404);
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// Unknown task/process/agent/interaction identifier.
    #[error("{0}")]
    NotFound(String),

    /// Malformed request: empty title, unknown process, cyclic dependency, ...
    #[error("validation error: {0}")]
    Validation(String),

    /// Process dependencies are unmet, or the process is not in `Pending`.
    #[error("process '{process_name}' on task '{task_id}' is not ready")]
    NotReady { task_id: String, process_name: String },

    /// `TryAcquireProcess` lost the compare-and-swap: another agent holds it.
    #[error("process '{process_name}' on task '{task_id}' already assigned to '{holder}'")]
    AlreadyAssigned {
        task_id: String,
        process_name: String,
        holder: String,
    },

    /// `CompleteProcess`/`RejectProcess` called by an agent that isn't the holder.
    #[error("process '{process_name}' on task '{task_id}' is not assigned to '{caller}'")]
    NotAssignedToCaller {
        task_id: String,
        process_name: String,
        caller: String,
    },

    /// The interaction has already been answered, cancelled, or has expired.
    #[error("interaction '{0}' is already terminal")]
    AlreadyTerminal(String),

    /// Policy refusal: illegal transition, `CloseTask` with processes still open.
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// A bounded wait exceeded its timeout budget.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The enclosing context was cancelled before the operation completed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Unrecoverable invariant violation or underlying repository failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Create a not-found error naming the kind of entity and its identifier.
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound(format!("{kind} '{id}' not found"))
    }

    pub fn unknown_process(task_id: &str, process_name: &str) -> Self {
        Self::Validation(format!(
            "process '{process_name}' is not defined on task '{task_id}'"
        ))
    }

    pub fn empty_field(field: &str) -> Self {
        Self::Validation(format!("field '{field}' cannot be empty"))
    }

    pub fn not_ready(task_id: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self::NotReady {
            task_id: task_id.into(),
            process_name: process_name.into(),
        }
    }

    /// Check if this error indicates a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TaskError::NotFound(_))
    }

    /// Check if this error indicates a validation problem.
    pub fn is_validation(&self) -> bool {
        matches!(self, TaskError::Validation(_))
    }

    /// Check if this error indicates a lost compare-and-swap race.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TaskError::AlreadyAssigned { .. } | TaskError::AlreadyTerminal(_)
        )
    }

    /// Convert to an HTTP-style status code for the RPC transport edge.
    pub fn status_code(&self) -> u16 {
        match self {
            TaskError::NotFound(_) => 404,
            TaskError::Validation(_) => 400,
            TaskError::NotReady { .. } => 409,
            TaskError::AlreadyAssigned { .. } => 409,
            TaskError::NotAssignedToCaller { .. } => 403,
            TaskError::AlreadyTerminal(_) => 409,
            TaskError::NotAllowed(_) => 422,
            TaskError::Timeout(_) => 504,
            TaskError::Cancelled(_) => 499,
            TaskError::Internal(_) => 500,
        }
    }
}
