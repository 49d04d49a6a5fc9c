//! The single-worker main loop that turns an idle pool slot into a process
//! executor: acquire, provision, dispatch, mediate permissions, settle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::event_bus::{DomainEvent, EventBus};
use crate::interaction::InteractionService;
use crate::models::{AgentStatus, InteractionKind, InteractionOption, ScalingConfig};
use crate::process_event_bus::ProcessChangeEvent;
use crate::runtime::{
    AgentRuntimeFactory, ExecutionOutcome, PermissionCallback, PermissionRequest, PermissionResponse, WorkItem, WorktreeManager,
};
use crate::task_service::TaskService;

const IDLE_POLL: Duration = Duration::from_secs(1);
const EVENT_SOURCE: &str = "agent";

/// Governs how `CanUseTool` requests raised by the runtime are mediated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// Everything outside the read-only allowlist goes to a human.
    Default,
    /// Edit tools are additionally auto-allowed.
    AcceptEdits,
    /// Every tool is auto-allowed; no interaction is ever raised.
    BypassPermissions,
}

#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    pub mode: PermissionMode,
    pub read_only_tools: HashSet<String>,
    pub edit_tools: HashSet<String>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            mode: PermissionMode::Default,
            read_only_tools: ["Read", "Glob", "Grep", "WebSearch", "WebFetch"].iter().map(|s| s.to_string()).collect(),
            edit_tools: ["Edit", "Write", "MultiEdit", "NotebookEdit"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PermissionPolicy {
    fn auto_allows(&self, tool_name: &str) -> bool {
        match self.mode {
            PermissionMode::BypassPermissions => true,
            PermissionMode::AcceptEdits => self.read_only_tools.contains(tool_name) || self.edit_tools.contains(tool_name),
            PermissionMode::Default => self.read_only_tools.contains(tool_name),
        }
    }
}

/// A cheap, clonable view of an agent's observable state, shared with the
/// pool's registry so it never needs to reach into the worker task itself.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub id: String,
    pub class: String,
    pub process_name: String,
    pub status: AgentStatus,
    pub current_task_id: Option<String>,
}

impl AgentSnapshot {
    pub fn is_idle(&self) -> bool {
        matches!(self.status, AgentStatus::Idle)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.status, AgentStatus::Busy)
    }
}

pub struct Agent {
    pub id: String,
    pub class: String,
    pub process_name: String,
    pub instructions: String,
    pub scaling: Option<ScalingConfig>,
    runtime_factory: Arc<dyn AgentRuntimeFactory>,
    worktree: Arc<dyn WorktreeManager>,
    task_service: Arc<TaskService>,
    interactions: Arc<InteractionService>,
    domain_events: Arc<EventBus>,
    permission_policy: PermissionPolicy,
    status: tokio::sync::watch::Sender<AgentSnapshot>,
}

enum Settled {
    Completed(crate::error::Result<crate::error::Result<ExecutionOutcome>>),
    Preempted,
    GlobalCancel,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        class: String,
        process_name: String,
        instructions: String,
        scaling: Option<ScalingConfig>,
        runtime_factory: Arc<dyn AgentRuntimeFactory>,
        worktree: Arc<dyn WorktreeManager>,
        task_service: Arc<TaskService>,
        interactions: Arc<InteractionService>,
        domain_events: Arc<EventBus>,
        permission_policy: PermissionPolicy,
    ) -> (Self, tokio::sync::watch::Receiver<AgentSnapshot>) {
        let snapshot = AgentSnapshot {
            id: id.clone(),
            class: class.clone(),
            process_name: process_name.clone(),
            status: AgentStatus::Idle,
            current_task_id: None,
        };
        let (status, rx) = tokio::sync::watch::channel(snapshot);
        let agent = Self {
            id,
            class,
            process_name,
            instructions,
            scaling,
            runtime_factory,
            worktree,
            task_service,
            interactions,
            domain_events,
            permission_policy,
            status,
        };
        (agent, rx)
    }

    fn set_status(&self, status: AgentStatus, current_task_id: Option<String>) {
        self.status.send_modify(|snapshot| {
            snapshot.status = status;
            snapshot.current_task_id = current_task_id;
        });
        self.domain_events.publish(
            DomainEvent::AgentStatusChanged { agent_id: self.id.clone(), status },
            EVENT_SOURCE,
        );
    }

    /// Runs until `cancel` fires. Exit is always clean: no process is left
    /// claimed under this agent's identity once `run` returns following a
    /// cancellation — either it completed/rejected normally, or a preempt
    /// had already cleared the assignment.
    pub async fn run(&self, cancel: CancellationToken) {
        self.domain_events.publish(DomainEvent::AgentStarted { agent_id: self.id.clone() }, EVENT_SOURCE);
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let task_id = match self.try_acquire_any(&cancel).await {
                Some(task_id) => task_id,
                None => break,
            };

            self.run_one(task_id, &cancel).await;
        }
        self.set_status(AgentStatus::Stopped, None);
        self.domain_events.publish(DomainEvent::AgentStopped { agent_id: self.id.clone() }, EVENT_SOURCE);
    }

    /// Scans and attempts acquisition until it wins one or `cancel` fires.
    async fn try_acquire_any(&self, cancel: &CancellationToken) -> Option<String> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            let candidates = match self.task_service.get_available_processes(&self.process_name).await {
                Ok(candidates) => candidates,
                Err(error) => {
                    tracing::warn!(agent_id = %self.id, %error, "failed to scan available processes");
                    Vec::new()
                }
            };

            for candidate in candidates {
                match self.task_service.try_acquire_process(&candidate.task_id, &self.process_name, &self.id).await {
                    Ok(_) => return Some(candidate.task_id),
                    Err(TaskError::AlreadyAssigned { .. }) | Err(TaskError::NotReady { .. }) => continue,
                    Err(error) => {
                        tracing::warn!(agent_id = %self.id, task_id = %candidate.task_id, %error, "acquisition attempt failed");
                        continue;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(IDLE_POLL) => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    async fn run_one(&self, task_id: String, cancel: &CancellationToken) {
        self.set_status(AgentStatus::Busy, Some(task_id.clone()));

        let worktree_path = match self.worktree.provision(&task_id).await {
            Ok(path) => Some(path),
            Err(error) => {
                tracing::warn!(agent_id = %self.id, task_id = %task_id, %error, "worktree provisioning failed, proceeding without one");
                None
            }
        };

        let (watch_id, watch_rx) = self.task_service.watch_process(&task_id, &self.process_name);
        let work = WorkItem {
            task_id: task_id.clone(),
            process_name: self.process_name.clone(),
            instructions: self.instructions.clone(),
            worktree_path: worktree_path.clone(),
        };

        let permission_cb = self.make_permission_callback(task_id.clone(), cancel.clone());
        // Shared rather than moved wholesale into the spawned task: an
        // `abort()` on `exec_handle` only drops that task's future at its
        // current await point, so `disconnect` must be reachable from the
        // outside too. The mutex guard held across `connect`/`execute` is a
        // plain local, so it still drops (and releases) on abort; the
        // lock below then always succeeds and runs disconnect regardless of
        // whether the exec task finished, was preempted, or was cancelled.
        let runtime: Arc<tokio::sync::Mutex<Box<dyn crate::runtime::AgentRuntime>>> =
            Arc::new(tokio::sync::Mutex::new(self.runtime_factory.create()));
        let exec_runtime = runtime.clone();

        let exec_handle = tokio::spawn(async move {
            let mut guard = exec_runtime.lock().await;
            match guard.connect().await {
                Ok(()) => guard.execute(work, permission_cb.as_ref()).await,
                Err(error) => Err(error),
            }
        });

        let settled = self.race(exec_handle, watch_rx, cancel).await;

        self.task_service.unwatch_process(&task_id, &self.process_name, watch_id);

        let disconnect_result = runtime.lock().await.disconnect().await;

        if let Some(path) = &worktree_path {
            if let Err(error) = self.worktree.release(&task_id, path).await {
                tracing::warn!(agent_id = %self.id, task_id = %task_id, %error, "worktree release failed");
            }
        }

        match settled {
            Settled::Completed(join_result) => self.settle_completion(&task_id, join_result, disconnect_result).await,
            Settled::Preempted => {
                tracing::info!(agent_id = %self.id, task_id = %task_id, process_name = %self.process_name, "preempted, abandoning claim");
                if let Err(error) = disconnect_result {
                    tracing::warn!(agent_id = %self.id, task_id = %task_id, %error, "runtime disconnect failed after preemption");
                }
            }
            Settled::GlobalCancel => {
                tracing::info!(agent_id = %self.id, task_id = %task_id, "cancelled, process left in progress for supervision");
                if let Err(error) = disconnect_result {
                    tracing::warn!(agent_id = %self.id, task_id = %task_id, %error, "runtime disconnect failed after cancellation");
                }
            }
        }

        self.set_status(AgentStatus::Idle, None);
    }

    async fn race(
        &self,
        mut exec_handle: tokio::task::JoinHandle<crate::error::Result<ExecutionOutcome>>,
        mut watch_rx: tokio::sync::mpsc::Receiver<ProcessChangeEvent>,
        cancel: &CancellationToken,
    ) -> Settled {
        let preempt = async {
            while let Some(event) = watch_rx.recv().await {
                if event.new_status == crate::models::ProcessStatus::Pending {
                    return;
                }
            }
            std::future::pending::<()>().await
        };

        tokio::select! {
            result = &mut exec_handle => Settled::Completed(result.map_err(|e| TaskError::Internal(e.to_string()))),
            _ = preempt => {
                exec_handle.abort();
                Settled::Preempted
            }
            _ = cancel.cancelled() => {
                exec_handle.abort();
                Settled::GlobalCancel
            }
        }
    }

    async fn settle_completion(
        &self,
        task_id: &str,
        join_result: crate::error::Result<crate::error::Result<ExecutionOutcome>>,
        disconnect_result: crate::error::Result<()>,
    ) {
        let exec_result = match join_result {
            Ok(exec_result) => exec_result,
            Err(error) => {
                tracing::warn!(agent_id = %self.id, task_id = %task_id, %error, "runtime worker task panicked or was aborted");
                self.set_status(AgentStatus::Error, None);
                return;
            }
        };

        let outcome = match exec_result.and_then(|outcome| disconnect_result.map(|()| outcome)) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(agent_id = %self.id, task_id = %task_id, %error, "runtime execution or disconnect failed");
                self.set_status(AgentStatus::Error, None);
                return;
            }
        };

        match outcome {
            ExecutionOutcome::CompleteProcess => {
                if let Err(error) = self.task_service.complete_process(task_id, &self.process_name, &self.id).await {
                    tracing::warn!(agent_id = %self.id, task_id = %task_id, %error, "complete_process failed");
                }
            }
            ExecutionOutcome::RejectProcess { reason } => {
                if let Err(error) = self.task_service.reject_process(task_id, &self.process_name, &self.id, &reason).await {
                    tracing::warn!(agent_id = %self.id, task_id = %task_id, %error, "reject_process failed");
                }
            }
            ExecutionOutcome::Advisory => {
                tracing::warn!(
                    agent_id = %self.id,
                    task_id = %task_id,
                    process_name = %self.process_name,
                    "runtime returned without a completion or rejection marker; leaving process in progress"
                );
            }
        }
    }

    fn make_permission_callback(&self, task_id: String, cancel: CancellationToken) -> Arc<PermissionCallback> {
        let agent_id = self.id.clone();
        let interactions = self.interactions.clone();
        let policy = self.permission_policy.clone();

        Arc::new(move |request: PermissionRequest| {
            let task_id = task_id.clone();
            let agent_id = agent_id.clone();
            let interactions = interactions.clone();
            let policy = policy.clone();
            let cancel = cancel.clone();
            Box::pin(async move {
                if policy.auto_allows(&request.tool_name) {
                    return PermissionResponse::Allow { updated_input: None };
                }
                grant_via_interaction(interactions, task_id, agent_id, request, cancel).await
            })
        })
    }
}

async fn grant_via_interaction(
    interactions: Arc<InteractionService>,
    task_id: String,
    agent_id: String,
    request: PermissionRequest,
    cancel: CancellationToken,
) -> PermissionResponse {
    let interaction_id = format!("perm-{}", uuid::Uuid::new_v4());
    let options = vec![
        InteractionOption { label: "Allow".into(), value: "allow".into(), description: None },
        InteractionOption { label: "Deny".into(), value: "deny".into(), description: None },
    ];
    let description = describe_request(&request);

    let interaction = match interactions.create_interaction(
        interaction_id,
        &task_id,
        &agent_id,
        InteractionKind::PermissionRequest,
        format!("Allow tool '{}'?", request.tool_name),
        description,
        options,
    ) {
        Ok(interaction) => interaction,
        Err(error) => return PermissionResponse::Deny { message: format!("could not raise permission request: {error}") },
    };

    let waiter = interactions.waiters().register(&interaction.id);
    tokio::select! {
        result = waiter => match result {
            Ok(answered) => match answered.response.as_deref() {
                Some("allow") => PermissionResponse::Allow { updated_input: None },
                other => PermissionResponse::Deny { message: other.unwrap_or("denied").to_string() },
            },
            Err(_) => PermissionResponse::Deny { message: "interaction waiter closed without delivery".to_string() },
        },
        _ = cancel.cancelled() => {
            interactions.waiters().unregister(&interaction.id);
            PermissionResponse::Deny { message: "context cancelled".to_string() }
        }
    }
}

fn describe_request(request: &PermissionRequest) -> String {
    match &request.tool_input {
        Value::Null => format!("{} requested with no input", request.tool_name),
        input => format!("{} requested with input: {input}", request.tool_name),
    }
}
