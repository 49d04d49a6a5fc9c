//! Custom assertion helpers for testing
//!
//! Provides specialized assertions for:
//! - Task equality with clear error messages
//! - Process-state invariant validation
//! - Collection-based assertions

use task_core::models::ProcessState;
use task_core::{Task, TaskStatus};

/// Assert tasks are equal ignoring timestamps.
pub fn assert_task_equals(actual: &Task, expected: &Task) {
    assert_eq!(actual.id, expected.id, "Task IDs don't match");
    assert_eq!(actual.title, expected.title, "Task titles don't match");
    assert_eq!(actual.description, expected.description, "Task descriptions don't match");
    assert_eq!(actual.task_type, expected.task_type, "Task types don't match");
    assert_eq!(actual.process_states, expected.process_states, "Process states don't match");
    // Note: created_at/updated_at are ignored in this assertion.
}

/// Assert tasks are equal including exact timestamps.
pub fn assert_task_equals_exact(actual: &Task, expected: &Task) {
    assert_eq!(actual, expected, "Tasks are not exactly equal");
}

/// Assert task matches partial criteria.
pub fn assert_task_matches(task: &Task, matcher: &TaskMatcher) {
    if let Some(ref expected_id) = matcher.id {
        assert_eq!(task.id, *expected_id, "Task ID doesn't match expected");
    }
    if let Some(ref expected_title) = matcher.title {
        assert_eq!(task.title, *expected_title, "Task title doesn't match expected");
    }
    if let Some(ref expected_task_type) = matcher.task_type {
        assert_eq!(task.task_type, *expected_task_type, "Task type doesn't match expected");
    }
    if let Some(expected_status) = matcher.status {
        assert_eq!(task.status(), expected_status, "Task status doesn't match expected");
    }
}

/// Assert that every process state on a task satisfies its own invariant
/// (`InProgress` iff an agent is assigned).
pub fn assert_task_process_states_consistent(task: &Task) {
    for (process, state) in &task.process_states {
        assert!(state.invariant_holds(), "Process '{process}' has an inconsistent state: {state:?}");
    }
}

/// Assert a bare [`ProcessState`] satisfies its own invariant.
pub fn assert_process_state_valid(state: &ProcessState) {
    assert!(state.invariant_holds(), "Process state is inconsistent: {state:?}");
}

/// Assert task list contains a task with the given id.
pub fn assert_contains_task_with_id(tasks: &[Task], id: &str) {
    assert!(
        tasks.iter().any(|t| t.id == id),
        "Expected to find task with id '{}' in task list, but it wasn't found. Available ids: {:?}",
        id,
        tasks.iter().map(|t| &t.id).collect::<Vec<_>>()
    );
}

/// Assert tasks are sorted by creation date (most recent first).
pub fn assert_tasks_sorted_by_date(tasks: &[Task]) {
    for window in tasks.windows(2) {
        assert!(
            window[0].created_at >= window[1].created_at,
            "Tasks are not sorted by creation date (most recent first). Task '{}' ({}) comes before '{}' ({})",
            window[0].id,
            window[0].created_at,
            window[1].id,
            window[1].created_at
        );
    }
}

/// Flexible task matcher for partial assertions.
#[derive(Debug, Default)]
pub struct TaskMatcher {
    pub id: Option<String>,
    pub title: Option<String>,
    pub task_type: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskMatcher {
    /// Create a new empty matcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match tasks with specific id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Match tasks with specific title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Match tasks with specific task type.
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Match tasks with specific derived status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }
}
