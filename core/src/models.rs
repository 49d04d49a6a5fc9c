use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A unit of work decomposed into a DAG of named processes.
///
/// The key set of `process_states` always equals the process names declared
/// by the [`crate::definition::TaskDefinition`] active when the task was
/// created; it never changes afterward (see [`Task::status`]).
///
/// # Examples
///
/// ```rust
/// use task_core::models::{Task, ProcessState};
/// use std::collections::HashMap;
///
/// let mut states = HashMap::new();
/// states.insert("implement".to_string(), ProcessState::pending());
/// let task = Task::new(
///     "T1".to_string(),
///     "Add login flow".to_string(),
///     "Wire up the OAuth handshake".to_string(),
///     "feature".to_string(),
///     states,
/// );
/// assert_eq!(task.status(), task_core::models::TaskStatus::Pending);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub task_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub process_states: HashMap<String, ProcessState>,
}

impl Task {
    pub fn new(
        id: String,
        title: String,
        description: String,
        task_type: String,
        process_states: HashMap<String, ProcessState>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            description,
            task_type,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            process_states,
        }
    }

    /// Derived overall status. Never stored — recomputed from the process map
    /// on every read so it can never drift from the authoritative states.
    pub fn status(&self) -> TaskStatus {
        if self
            .process_states
            .values()
            .all(|p| p.status == ProcessStatus::Completed)
        {
            TaskStatus::Closed
        } else if self
            .process_states
            .values()
            .any(|p| p.status == ProcessStatus::Rejected)
        {
            TaskStatus::Rejected
        } else if self
            .process_states
            .values()
            .any(|p| p.status == ProcessStatus::InProgress)
        {
            TaskStatus::InProgress
        } else {
            TaskStatus::Pending
        }
    }
}

/// Derived, never-persisted rollup of a task's process states.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Rejected,
    Closed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Rejected => write!(f, "rejected"),
            TaskStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Status of a single named process within a task.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Pending => write!(f, "pending"),
            ProcessStatus::InProgress => write!(f, "in_progress"),
            ProcessStatus::Completed => write!(f, "completed"),
            ProcessStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// One process's mutable state. `assigned_to` is non-empty iff
/// `status == InProgress`; completion and rejection always clear it — the
/// identity of the worker that held it is a historical property carried only
/// by events, never by this record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessState {
    pub status: ProcessStatus,
    pub assigned_to: Option<String>,
}

impl ProcessState {
    pub fn pending() -> Self {
        Self {
            status: ProcessStatus::Pending,
            assigned_to: None,
        }
    }

    pub fn in_progress(agent_id: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::InProgress,
            assigned_to: Some(agent_id.into()),
        }
    }

    pub fn completed() -> Self {
        Self {
            status: ProcessStatus::Completed,
            assigned_to: None,
        }
    }

    pub fn rejected() -> Self {
        Self {
            status: ProcessStatus::Rejected,
            assigned_to: None,
        }
    }

    /// `assigned_to` non-empty iff `status == InProgress`.
    pub fn invariant_holds(&self) -> bool {
        matches!(self.status, ProcessStatus::InProgress) == self.assigned_to.is_some()
    }
}

/// Request payload to create a new task. An explicit `id` is required —
/// identity is assigned by the caller (CLI, Runner, or an upstream
/// decomposition step), not minted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_task_type() -> String {
    "default".to_string()
}

/// Patch payload for [`crate::task_service::TaskService::update_task`].
/// Only `title`/`description`/`metadata` are settable; process status never
/// travels through this path.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

/// Filter criteria for [`crate::repository::TaskRepository::list`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub task_type: Option<String>,
    pub status: Option<TaskStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// A question or permission request raised by a running agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub id: String,
    pub task_id: String,
    pub agent_id: String,
    pub kind: InteractionKind,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub options: Vec<InteractionOption>,
    pub status: InteractionStatus,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Interaction {
    pub fn new(
        id: String,
        task_id: String,
        agent_id: String,
        kind: InteractionKind,
        title: String,
        description: String,
        options: Vec<InteractionOption>,
    ) -> Self {
        Self {
            id,
            task_id,
            agent_id,
            kind,
            title,
            description,
            options,
            status: InteractionStatus::Pending,
            response: None,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, InteractionStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Question,
    PermissionRequest,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Pending,
    Responded,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionOption {
    pub label: String,
    pub value: String,
    pub description: Option<String>,
}

/// Runtime record of one pool-owned worker, `<class>-NNNN` identified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: String,
    pub class: String,
    pub process_name: String,
    pub instructions: String,
    pub scaling: Option<ScalingConfig>,
    pub status: AgentStatus,
    pub current_task_id: Option<String>,
    pub current_process_name: Option<String>,
    pub worktree_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: String, class: String, process_name: String, instructions: String, scaling: Option<ScalingConfig>) -> Self {
        let now = Utc::now();
        Self {
            id,
            class,
            process_name,
            instructions,
            scaling,
            status: AgentStatus::Idle,
            current_task_id: None,
            current_process_name: None,
            worktree_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.status, AgentStatus::Idle)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.status, AgentStatus::Busy)
    }
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Waiting,
    Error,
    Stopped,
}

/// Per-class autoscaling policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScalingConfig {
    pub min: u32,
    pub max: u32,
    pub auto: bool,
}

impl ScalingConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.max < self.min {
            return Err(crate::error::TaskError::Validation(
                "scaling.max must be >= scaling.min".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(statuses: &[ProcessStatus]) -> Task {
        let mut states = HashMap::new();
        for (i, status) in statuses.iter().enumerate() {
            let state = match status {
                ProcessStatus::InProgress => ProcessState::in_progress("dev-0001"),
                ProcessStatus::Completed => ProcessState::completed(),
                ProcessStatus::Rejected => ProcessState::rejected(),
                ProcessStatus::Pending => ProcessState::pending(),
            };
            states.insert(format!("p{i}"), state);
        }
        Task::new("T1".into(), "title".into(), "desc".into(), "feature".into(), states)
    }

    #[test]
    fn overall_status_all_pending() {
        let task = task_with(&[ProcessStatus::Pending, ProcessStatus::Pending]);
        assert_eq!(task.status(), TaskStatus::Pending);
    }

    #[test]
    fn overall_status_any_in_progress() {
        let task = task_with(&[ProcessStatus::Completed, ProcessStatus::InProgress]);
        assert_eq!(task.status(), TaskStatus::InProgress);
    }

    #[test]
    fn overall_status_any_rejected_wins_over_in_progress() {
        let task = task_with(&[ProcessStatus::Rejected, ProcessStatus::InProgress]);
        assert_eq!(task.status(), TaskStatus::Rejected);
    }

    #[test]
    fn overall_status_closed_only_when_all_completed() {
        let task = task_with(&[ProcessStatus::Completed, ProcessStatus::Completed]);
        assert_eq!(task.status(), TaskStatus::Closed);
    }

    #[test]
    fn process_state_invariant() {
        assert!(ProcessState::pending().invariant_holds());
        assert!(ProcessState::in_progress("dev-0001").invariant_holds());
        assert!(ProcessState::completed().invariant_holds());
        assert!(ProcessState::rejected().invariant_holds());
    }

    #[test]
    fn scaling_config_rejects_inverted_bounds() {
        let scaling = ScalingConfig { min: 3, max: 1, auto: true };
        assert!(scaling.validate().is_err());
    }
}
