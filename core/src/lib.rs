//! Task orchestration core.
//!
//! The daemon's whole state machine lives here: the process-DAG definition,
//! the authoritative [`Task`] store and its single-writer-per-task
//! serialization, the [`task_service::TaskService`] compare-and-swap
//! operations, the interaction waiter used to mediate agent permission
//! requests, and the agent pool that drives everything end to end. Every
//! other crate in the workspace (`taskguild-protocol`, `taskguild-server`,
//! `database`, `mocks`) depends on the types defined here rather than the
//! other way around.
//!
//! # Architecture
//!
//! - [`models`] — domain types: `Task`, `ProcessState`, `Interaction`, `Agent`
//! - [`definition`] — the static process DAG loaded from YAML at startup
//! - [`error`] — the `TaskError` taxonomy and its RPC status mapping
//! - [`repository`] — the `TaskRepository` persistence trait
//! - [`validation`] — identifier and payload validation shared across the core
//! - [`runtime`] — the opaque `AgentRuntime`/`WorktreeManager` collaborators
//! - [`process_event_bus`] — keyed process-status pub/sub
//! - [`event_bus`] — typed domain-event topic bus
//! - [`task_store`] — per-task locking, commit, and event publication
//! - [`task_service`] — the process acquisition/completion/rejection state machine
//! - [`interaction`] — question/permission-request lifecycle and waiter registry
//! - [`agent`] — the single-agent main loop
//! - [`agent_pool`] — agent lifecycle, sequential IDs, auto-scaling

pub mod agent;
pub mod agent_pool;
pub mod definition;
pub mod error;
pub mod event_bus;
pub mod interaction;
pub mod models;
pub mod process_event_bus;
pub mod repository;
pub mod runtime;
pub mod task_service;
pub mod task_store;
pub mod validation;

pub use definition::{OnAllComplete, ProcessDefinition, TaskDefinition};
pub use error::{Result, TaskError};
pub use models::{
    Agent as AgentRecord, AgentStatus, Interaction, InteractionKind, InteractionOption, InteractionStatus, NewTask,
    ProcessState, ProcessStatus, ScalingConfig, Task, TaskFilter, TaskStatus, UpdateTask,
};
pub use repository::{RepositoryStats, TaskRepository};
pub use runtime::{AgentRuntime, AgentRuntimeFactory, ExecutionOutcome, WorktreeManager};
pub use task_service::TaskService;
pub use task_store::TaskStore;
pub use validation::TaskValidator;

/// Current version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name.
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_constants_are_populated() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "task-core");
    }

    #[test]
    fn re_exports_resolve() {
        let error = TaskError::not_found("task", "T1");
        assert!(error.is_not_found());
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
    }
}
