//! Minimal concrete [`AgentRuntime`]: runs a class's `instructions` as a
//! shell command in the task's worktree and reads its exit status as the
//! completion marker. Real AI-CLI transports (interactive tool-use,
//! mid-execution permission requests) are an opaque collaborator this
//! daemon does not implement; this runtime never calls `on_permission`.

use async_trait::async_trait;
use task_core::error::{Result, TaskError};
use task_core::runtime::{AgentRuntime, AgentRuntimeFactory, ExecutionOutcome, PermissionCallback, WorkItem};
use tokio::process::Command;

pub struct ShellAgentRuntime;

#[async_trait]
impl AgentRuntime for ShellAgentRuntime {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn execute(&mut self, work: WorkItem, _on_permission: &PermissionCallback) -> Result<ExecutionOutcome> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(&work.instructions);
        command.env("TASKGUILD_TASK_ID", &work.task_id);
        command.env("TASKGUILD_PROCESS_NAME", &work.process_name);
        if let Some(worktree_path) = &work.worktree_path {
            command.current_dir(worktree_path);
            command.env("TASKGUILD_WORKTREE_PATH", worktree_path);
        }

        let output = command.output().await.map_err(|e| TaskError::Internal(format!("failed to spawn agent command: {e}")))?;

        if output.status.success() {
            Ok(ExecutionOutcome::CompleteProcess)
        } else {
            Ok(ExecutionOutcome::RejectProcess { reason: String::from_utf8_lossy(&output.stderr).trim().to_string() })
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct ShellAgentRuntimeFactory;

impl AgentRuntimeFactory for ShellAgentRuntimeFactory {
    fn create(&self) -> Box<dyn AgentRuntime> {
        Box::new(ShellAgentRuntime)
    }
}
