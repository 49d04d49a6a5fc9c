//! Builder pattern implementations for easy test data construction
//!
//! Provides fluent builders for:
//! - Task construction with sensible defaults
//! - NewTask and UpdateTask variants
//! - Filter construction for query testing

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use task_core::models::ProcessState;
use task_core::{NewTask, Task, TaskFilter, TaskStatus, UpdateTask};

use crate::generators::sample_definition;

/// Builder for constructing [`Task`] instances in tests.
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    /// Create new builder with default values.
    pub fn new() -> Self {
        Self {
            task: Task::new(
                "TEST-001".to_string(),
                "Test Task".to_string(),
                "A test task".to_string(),
                "feature".to_string(),
                sample_definition().initial_states(),
            ),
        }
    }

    /// Set task id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.task.id = id.into();
        self
    }

    /// Set task title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.task.title = title.into();
        self
    }

    /// Set task description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.task.description = description.into();
        self
    }

    /// Set task type.
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task.task_type = task_type.into();
        self
    }

    /// Set the named process's state directly.
    pub fn with_process_state(mut self, process: impl Into<String>, state: ProcessState) -> Self {
        self.task.process_states.insert(process.into(), state);
        self
    }

    /// Set `implement`'s status to the given [`TaskStatus`], leaving
    /// `review`/`qa` pending unless that status is `Closed`.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        let state = match status {
            TaskStatus::Pending => ProcessState::pending(),
            TaskStatus::InProgress => ProcessState::in_progress("agent-0001"),
            TaskStatus::Closed => ProcessState::completed(),
            TaskStatus::Rejected => ProcessState::rejected(),
        };
        self.task.process_states.insert("implement".to_string(), state);
        if status == TaskStatus::Closed {
            for name in ["review", "qa"] {
                self.task.process_states.insert(name.to_string(), ProcessState::completed());
            }
        }
        self
    }

    /// Set creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self
    }

    /// Set a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.task.metadata.insert(key.into(), value.into());
        self
    }

    /// Build the final [`Task`].
    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for constructing [`NewTask`] instances in tests.
pub struct NewTaskBuilder {
    new_task: NewTask,
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NewTaskBuilder {
    /// Create new builder with default values.
    pub fn new() -> Self {
        Self {
            new_task: NewTask {
                id: "NEW-001".to_string(),
                title: "New Test Task".to_string(),
                description: "A new test task".to_string(),
                task_type: "feature".to_string(),
                metadata: HashMap::new(),
            },
        }
    }

    /// Set id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.new_task.id = id.into();
        self
    }

    /// Set title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.new_task.title = title.into();
        self
    }

    /// Set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.new_task.description = description.into();
        self
    }

    /// Set task type.
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.new_task.task_type = task_type.into();
        self
    }

    /// Build the final [`NewTask`].
    pub fn build(self) -> NewTask {
        self.new_task
    }
}

/// Builder for constructing [`UpdateTask`] instances in tests.
#[derive(Default)]
pub struct UpdateTaskBuilder {
    update_task: UpdateTask,
}

impl UpdateTaskBuilder {
    /// Create new builder with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set title update.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.update_task.title = Some(title.into());
        self
    }

    /// Set description update.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.update_task.description = Some(description.into());
        self
    }

    /// Set a metadata entry, replacing the whole map if this is the first call.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.update_task.metadata.get_or_insert_with(HashMap::new).insert(key.into(), value.into());
        self
    }

    /// Build the final [`UpdateTask`].
    pub fn build(self) -> UpdateTask {
        self.update_task
    }
}

/// Builder for constructing [`TaskFilter`] instances in tests.
#[derive(Default)]
pub struct TaskFilterBuilder {
    filter: TaskFilter,
}

impl TaskFilterBuilder {
    /// Create new builder with no constraints set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by task type.
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.filter.task_type = Some(task_type.into());
        self
    }

    /// Filter by derived status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.filter.status = Some(status);
        self
    }

    /// Filter by creation date lower bound.
    pub fn with_created_after(mut self, created_after: DateTime<Utc>) -> Self {
        self.filter.created_after = Some(created_after);
        self
    }

    /// Filter by creation date upper bound.
    pub fn with_created_before(mut self, created_before: DateTime<Utc>) -> Self {
        self.filter.created_before = Some(created_before);
        self
    }

    /// Build the final [`TaskFilter`].
    pub fn build(self) -> TaskFilter {
        self.filter
    }
}
