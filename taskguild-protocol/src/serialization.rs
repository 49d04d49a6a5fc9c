//! Request/response DTOs for the RPC surface, plus the small JSON-RPC
//! envelope helpers the handlers share.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use task_core::{InteractionKind, InteractionOption, NewTask, TaskFilter, TaskStatus, UpdateTask};

use crate::error::ProtocolError;

pub fn deserialize_params<T>(params: Value) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(params).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

pub fn success_response(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "result": result, "id": id })
}

// ---- Task RPC surface -----------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskParams {
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

impl From<CreateTaskParams> for NewTask {
    fn from(params: CreateTaskParams) -> Self {
        NewTask {
            id: params.id,
            title: params.title,
            description: params.description,
            task_type: params.task_type,
            metadata: params.metadata,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksParams {
    pub task_type: Option<String>,
    pub status: Option<TaskStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<ListTasksParams> for TaskFilter {
    fn from(params: ListTasksParams) -> Self {
        TaskFilter {
            task_type: params.task_type,
            status: params.status,
            created_after: params.created_after,
            created_before: params.created_before,
            limit: params.limit,
            offset: params.offset,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetTaskParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskParams {
    pub task_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl From<UpdateTaskParams> for UpdateTask {
    fn from(params: UpdateTaskParams) -> Self {
        UpdateTask { title: params.title, description: params.description, metadata: params.metadata }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloseTaskParams {
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TryAcquireProcessParams {
    pub task_id: String,
    pub process_name: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteProcessParams {
    pub task_id: String,
    pub process_name: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectProcessParams {
    pub task_id: String,
    pub process_name: String,
    pub agent_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectProcessResult {
    pub reset_processes: Vec<String>,
}

/// By this crate's resolution of an open question left by the Task RPC
/// surface listing: overall status is derived from process state and has no
/// direct setter, so the only legal caller-requested transition is to
/// `closed`, which delegates to the same advisory policy as `CloseTask`.
/// Any other requested status is rejected with `NotAllowed`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskStatusParams {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetAvailableProcessesParams {
    pub process_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchProcessParams {
    pub task_id: String,
    pub process_name: String,
}

// ---- Agent manager RPC surface --------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportedAgentStatus {
    Idle,
    Busy,
    Waiting,
    Error,
    Stopped,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportAgentStatusParams {
    pub agent_id: String,
    pub status: ReportedAgentStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportTaskResultParams {
    pub agent_id: String,
    pub task_id: String,
    pub status: TaskResultStatus,
    #[serde(default)]
    pub summary: String,
    pub error_message: Option<String>,
}

/// Snapshot of the last status/result reported for one agent — this board is
/// owned by the protocol layer, not the core: `AgentPool` tracks liveness
/// and busy/idle state for its own scaling decisions, but has no API for an
/// out-of-process Runner to push observability updates into, so those land
/// here instead.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentStatusReport {
    pub agent_id: String,
    pub status: Option<ReportedAgentStatus>,
    pub message: String,
    pub last_task_id: Option<String>,
    pub last_result: Option<TaskResultStatus>,
    pub last_result_summary: Option<String>,
    pub last_result_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInteractionParams {
    pub id: String,
    pub task_id: String,
    pub agent_id: String,
    pub kind: InteractionKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<InteractionOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetInteractionResponseParams {
    pub interaction_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondInteractionParams {
    pub interaction_id: String,
    pub response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeInteractionsParams {
    pub task_id: String,
}

// ---- Event RPC surface -----------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetEventLogsParams {
    pub topic: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishEventParams {
    pub topic: String,
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_task_params_default_to_default_task_type() {
        let params: CreateTaskParams =
            deserialize_params(json!({"id": "T1", "title": "t", "description": "d"})).unwrap();
        assert_eq!(params.task_type, "default");
    }

    #[test]
    fn list_tasks_params_convert_to_filter() {
        let params: ListTasksParams = deserialize_params(json!({"task_type": "feature", "limit": 10})).unwrap();
        let filter: TaskFilter = params.into();
        assert_eq!(filter.task_type, Some("feature".to_string()));
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn success_response_shape() {
        let response = success_response(Some(json!(1)), json!({"ok": true}));
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["result"]["ok"], true);
    }
}
