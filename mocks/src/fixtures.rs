//! Standard test fixtures for consistent testing
//!
//! Pre-built tasks in various process states, plus bulk generators, all
//! against the `implement -> review, qa` shape from [`crate::sample_definition`].

use std::collections::HashMap;

use task_core::models::ProcessState;
use task_core::{NewTask, Task, TaskStatus, UpdateTask};

use crate::generators::sample_definition;

/// A basic task with all processes pending.
pub fn create_test_task() -> Task {
    let definition = sample_definition();
    Task::new(
        "FIX-001".to_string(),
        "Test Task".to_string(),
        "A standard test task with default values".to_string(),
        "feature".to_string(),
        definition.initial_states(),
    )
}

/// A task whose `implement` process carries the given status.
pub fn create_test_task_with_status(status: TaskStatus) -> Task {
    let mut task = create_test_task();
    let state = match status {
        TaskStatus::Pending => ProcessState::pending(),
        TaskStatus::InProgress => ProcessState::in_progress("agent-0001"),
        TaskStatus::Closed => ProcessState::completed(),
        TaskStatus::Rejected => ProcessState::rejected(),
    };
    task.process_states.insert("implement".to_string(), state);
    if status == TaskStatus::Closed {
        for name in ["review", "qa"] {
            task.process_states.insert(name.to_string(), ProcessState::completed());
        }
    }
    task
}

/// A task with `implement` assigned to the given agent.
pub fn create_test_task_with_assignee(agent_id: &str) -> Task {
    let mut task = create_test_task();
    task.process_states.insert("implement".to_string(), ProcessState::in_progress(agent_id));
    task
}

/// Create `count` unique tasks, cycling through pending/in-progress/rejected/closed.
pub fn create_test_tasks(count: usize) -> Vec<Task> {
    (1..=count)
        .map(|i| {
            let status = match i % 4 {
                0 => TaskStatus::Pending,
                1 => TaskStatus::InProgress,
                2 => TaskStatus::Rejected,
                _ => TaskStatus::Closed,
            };
            let mut task = create_test_task_with_status(status);
            task.id = format!("FIX-{i:03}");
            task.title = format!("Test Task {i}");
            task.description = format!("Test task number {i} for bulk testing");
            task
        })
        .collect()
}

/// One task for each [`TaskStatus`] variant.
pub fn create_tasks_in_all_states() -> Vec<Task> {
    [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Rejected, TaskStatus::Closed]
        .into_iter()
        .map(|status| {
            let mut task = create_test_task_with_status(status);
            task.id = format!("{status:?}-001").to_uppercase();
            task.title = format!("{status:?} Task");
            task.description = format!("Task in {status:?} state");
            task
        })
        .collect()
}

/// A standard [`NewTask`] for testing creation.
pub fn create_new_task() -> NewTask {
    NewTask {
        id: "FIX-NEW-001".to_string(),
        title: "New Test Task".to_string(),
        description: "A new task for testing creation".to_string(),
        task_type: "feature".to_string(),
        metadata: HashMap::new(),
    }
}

/// A [`NewTask`] with a specific id.
pub fn create_new_task_with_id(id: &str) -> NewTask {
    let mut task = create_new_task();
    task.id = id.to_string();
    task
}

/// A standard [`UpdateTask`] touching title and description.
pub fn create_update_task() -> UpdateTask {
    UpdateTask {
        title: Some("Updated Task Name".to_string()),
        description: Some("Updated task description".to_string()),
        metadata: None,
    }
}

/// An [`UpdateTask`] touching only the title.
pub fn create_update_task_with_title(title: &str) -> UpdateTask {
    UpdateTask { title: Some(title.to_string()), description: None, metadata: None }
}
