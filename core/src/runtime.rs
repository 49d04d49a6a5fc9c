//! Opaque collaborators the core drives but does not implement: the AI CLI
//! transport and the git worktree provisioner. Both stay behind trait
//! boundaries so the concurrency machine depends only on the interface.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One unit of dispatched work handed to an [`AgentRuntime`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    pub task_id: String,
    pub process_name: String,
    pub instructions: String,
    pub worktree_path: Option<String>,
}

/// Terminal marker an [`AgentRuntime::execute`] completion resolves to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ExecutionOutcome {
    /// The runtime invoked its completion marker.
    CompleteProcess,
    /// The runtime invoked its rejection marker with a human-readable reason.
    RejectProcess { reason: String },
    /// Neither marker was observed; the agent leaves the process in progress
    /// for the next loop iteration to observe.
    Advisory,
}

/// A tool-use request the runtime is about to perform, mediated by the
/// agent's permission policy before being allowed through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionRequest {
    pub tool_name: String,
    pub tool_input: Value,
}

/// The agent's (or, failing auto-resolution, the human operator's) answer to
/// a [`PermissionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PermissionResponse {
    Allow { updated_input: Option<Value> },
    Deny { message: String },
}

/// Callback an [`AgentRuntime`] invokes for every tool-use request it raises
/// mid-execution; resolves once the agent's permission policy (or, for
/// mediated requests, the human operator via an interaction) decides.
pub type PermissionCallback =
    dyn Fn(PermissionRequest) -> BoxFuture<'static, PermissionResponse> + Send + Sync;

/// The opaque AI-CLI wrapper an [`crate::agent::Agent`] drives exclusively
/// for the lifetime of one process execution.
///
/// Connection discipline: every `connect` is paired with exactly one
/// `disconnect` on all exit paths, including cancellation — the `Agent` main
/// loop enforces this with a scope guard, not this trait.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn connect(&mut self) -> Result<()>;

    /// Drive `work` to completion, polling `on_permission` for every tool-use
    /// request the underlying CLI raises. Returns once the runtime observes
    /// a terminal marker in its output or the enclosing context is
    /// cancelled.
    async fn execute(
        &mut self,
        work: WorkItem,
        on_permission: &PermissionCallback,
    ) -> Result<ExecutionOutcome>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// Git worktree provisioning, opaque to the core beyond acquire/release.
#[async_trait]
pub trait WorktreeManager: Send + Sync {
    async fn provision(&self, task_id: &str) -> Result<String>;
    async fn release(&self, task_id: &str, worktree_path: &str) -> Result<()>;
}

/// Mints a fresh [`AgentRuntime`] for each process execution. An `Agent`
/// never keeps a runtime instance past the work item it was created for —
/// on preemption or cancellation the runtime is disconnected from outside
/// the aborted execution task, then dropped.
pub trait AgentRuntimeFactory: Send + Sync {
    fn create(&self) -> Box<dyn AgentRuntime>;
}
