//! Random test data generators using the `fake` crate.

use std::collections::HashMap;

use fake::faker::lorem::en::{Paragraph, Sentence};
use fake::Fake;
use proptest::prelude::*;
use rand::Rng;
use task_core::definition::{OnAllComplete, ProcessDefinition, TaskDefinition};
use task_core::models::ProcessState;
use task_core::{Task, TaskFilter, TaskStatus};

/// Generate a realistic task-type tag (e.g., "feature", "bugfix").
pub fn generate_task_type() -> String {
    let types = ["feature", "bugfix", "refactor", "docs", "chore"];
    types[rand::thread_rng().gen_range(0..types.len())].to_string()
}

/// Generate a realistic agent class name.
pub fn generate_agent_class() -> String {
    let classes = ["implementer", "reviewer", "qa-engineer", "security-auditor", "doc-writer"];
    classes[rand::thread_rng().gen_range(0..classes.len())].to_string()
}

pub fn generate_task_title() -> String {
    Sentence(3..8).fake()
}

pub fn generate_task_description() -> String {
    Paragraph(2..5).fake()
}

fn generate_task_id() -> String {
    let n: u32 = (1..999_999).fake();
    format!("T{n:06}")
}

/// A linear `implement -> review -> qa` definition, convenient for tests
/// that don't care about the DAG shape.
pub fn sample_definition() -> TaskDefinition {
    TaskDefinition::new(
        vec![
            ProcessDefinition { name: "implement".to_string(), description: None, depends_on: vec![] },
            ProcessDefinition { name: "review".to_string(), description: None, depends_on: vec!["implement".to_string()] },
            ProcessDefinition { name: "qa".to_string(), description: None, depends_on: vec!["implement".to_string()] },
        ],
        Some(OnAllComplete::Close),
    )
    .expect("sample definition is well-formed")
}

/// A task with the given id/task_type, all processes pending, against
/// [`sample_definition`].
pub fn sample_task(id: &str, task_type: &str) -> Task {
    let definition = sample_definition();
    Task::new(id.to_string(), generate_task_title(), generate_task_description(), task_type.to_string(), definition.initial_states())
}

/// Generate a task with realistic random title/description against
/// [`sample_definition`], in a random process state.
pub fn generate_random_task() -> Task {
    let definition = sample_definition();
    let mut states = definition.initial_states();
    if let Some(state) = states.get_mut("implement") {
        *state = generate_random_process_state();
    }
    Task::new(generate_task_id(), generate_task_title(), generate_task_description(), generate_task_type(), states)
}

pub fn generate_random_process_state() -> ProcessState {
    match rand::thread_rng().gen_range(0..4) {
        0 => ProcessState::pending(),
        1 => ProcessState::in_progress("agent-0001"),
        2 => ProcessState::completed(),
        _ => ProcessState::rejected(),
    }
}

/// Configurable task generator.
pub struct TaskGenerator {
    pub task_type_prefix: String,
    pub definition: TaskDefinition,
}

impl Default for TaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGenerator {
    pub fn new() -> Self {
        Self { task_type_prefix: "test".to_string(), definition: sample_definition() }
    }

    pub fn generate(&self) -> Task {
        Task::new(
            generate_task_id(),
            generate_task_title(),
            generate_task_description(),
            format!("{}-{}", self.task_type_prefix, generate_task_type()),
            self.definition.initial_states(),
        )
    }
}

/// Proptest strategy for task ids.
pub fn task_id_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z0-9]{2,20}"
}

/// Proptest strategy for task statuses.
pub fn task_status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Rejected),
        Just(TaskStatus::Closed),
    ]
}

fn process_states_for(status: TaskStatus) -> HashMap<String, ProcessState> {
    let mut states = HashMap::new();
    let process_state = match status {
        TaskStatus::Pending => ProcessState::pending(),
        TaskStatus::InProgress => ProcessState::in_progress("agent-0001"),
        TaskStatus::Rejected => ProcessState::rejected(),
        TaskStatus::Closed => ProcessState::completed(),
    };
    states.insert("implement".to_string(), process_state);
    states
}

/// Proptest strategy for generating complete tasks with a derived status
/// matching the requested one.
pub fn task_strategy() -> impl Strategy<Value = Task> {
    (task_id_strategy(), "[A-Za-z ]{5,50}", "[A-Za-z0-9 .,!?]{10,200}", "[a-z-]{5,20}", task_status_strategy()).prop_map(
        |(id, title, description, task_type, status)| Task::new(id, title, description, task_type, process_states_for(status)),
    )
}

/// Proptest strategy for task filters.
pub fn task_filter_strategy() -> impl Strategy<Value = TaskFilter> {
    (proptest::option::of("[a-z-]{5,20}"), proptest::option::of(task_status_strategy())).prop_map(|(task_type, status)| TaskFilter {
        task_type,
        status,
        created_after: None,
        created_before: None,
        limit: None,
        offset: None,
    })
}
