//! axum `Router` exposing the daemon's RPC surface: one JSON-RPC style POST
//! endpoint for request/response operations, SSE endpoints for the three
//! server-streaming operations (`WatchProcess`, `SubscribeInteractions`,
//! `SubscribeEvents`), and a health check.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::error::ProtocolError;
use crate::handler::TaskGuildHandler;
use crate::serialization::{
    success_response, CloseTaskParams, CompleteProcessParams, CreateInteractionParams, CreateTaskParams,
    GetAvailableProcessesParams, GetEventLogsParams, ListTasksParams, PublishEventParams, RejectProcessParams,
    RejectProcessResult, ReportAgentStatusParams, ReportTaskResultParams, RespondInteractionParams,
    TryAcquireProcessParams, UpdateTaskParams, UpdateTaskStatusParams,
};

const HEARTBEAT: Duration = Duration::from_secs(30);

pub fn router(handler: Arc<TaskGuildHandler>) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/tasks/:task_id/processes/:process_name/watch", get(watch_process_handler))
        .route("/interactions/subscribe/:task_id", get(subscribe_interactions_handler))
        .route("/events/subscribe", get(subscribe_events_handler))
        .route("/health", get(health_handler))
        .with_state(handler)
}

/// Binds `addr` and serves the RPC router until the listener errors or the
/// process is killed. The daemon binary races this against its own shutdown
/// signal handling.
pub async fn serve(handler: Arc<TaskGuildHandler>, addr: &str) -> std::io::Result<()> {
    let app = router(handler);
    info!("Starting taskguild RPC server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn execute_method(handler: &TaskGuildHandler, method: &str, params: Value) -> Result<Value, ProtocolError> {
    use crate::serialization::deserialize_params as p;

    match method {
        "create_task" => {
            let task = handler.create_task(p::<CreateTaskParams>(params)?).await?;
            Ok(serde_json::to_value(task).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "list_tasks" => {
            let tasks = handler.list_tasks(p::<ListTasksParams>(params)?).await?;
            Ok(serde_json::to_value(tasks).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "get_task" => {
            let task_id = params.get("task_id").and_then(Value::as_str).ok_or_else(|| {
                ProtocolError::Malformed("missing 'task_id'".to_string())
            })?;
            let task = handler.get_task(task_id).await?;
            Ok(serde_json::to_value(task).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "update_task" => {
            let task = handler.update_task(p::<UpdateTaskParams>(params)?).await?;
            Ok(serde_json::to_value(task).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "close_task" => {
            let req = p::<CloseTaskParams>(params)?;
            let task = handler.close_task(&req.task_id).await?;
            Ok(serde_json::to_value(task).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "try_acquire_process" => {
            let req = p::<TryAcquireProcessParams>(params)?;
            let task = handler.try_acquire_process(&req.task_id, &req.process_name, &req.agent_id).await?;
            Ok(serde_json::to_value(task).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "complete_process" => {
            let req = p::<CompleteProcessParams>(params)?;
            handler.complete_process(&req.task_id, &req.process_name, &req.agent_id).await?;
            Ok(Value::Null)
        }
        "reject_process" => {
            let req = p::<RejectProcessParams>(params)?;
            let reset = handler
                .reject_process(&req.task_id, &req.process_name, &req.agent_id, &req.reason)
                .await?;
            Ok(serde_json::to_value(RejectProcessResult { reset_processes: reset })
                .map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "update_task_status" => {
            let task = handler.update_task_status(p::<UpdateTaskStatusParams>(params)?).await?;
            Ok(serde_json::to_value(task).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "get_available_processes" => {
            let req = p::<GetAvailableProcessesParams>(params)?;
            let available = handler.get_available_processes(&req.process_name).await?;
            Ok(serde_json::to_value(available).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "report_agent_status" => {
            handler.report_agent_status(p::<ReportAgentStatusParams>(params)?)?;
            Ok(Value::Null)
        }
        "report_task_result" => {
            handler.report_task_result(p::<ReportTaskResultParams>(params)?)?;
            Ok(Value::Null)
        }
        "create_interaction" => {
            let interaction = handler.create_interaction(p::<CreateInteractionParams>(params)?)?;
            Ok(serde_json::to_value(interaction).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "get_interaction_response" => {
            let interaction_id = params
                .get("interaction_id")
                .and_then(Value::as_str)
                .ok_or_else(|| ProtocolError::Malformed("missing 'interaction_id'".to_string()))?;
            let interaction = handler.get_interaction_response(interaction_id)?;
            Ok(serde_json::to_value(interaction).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "respond_interaction" => {
            let interaction = handler.respond_interaction(p::<RespondInteractionParams>(params)?)?;
            Ok(serde_json::to_value(interaction).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "get_event_logs" => {
            let req = p::<GetEventLogsParams>(params)?;
            let logs = handler.get_event_logs(req.topic.as_deref(), req.limit);
            Ok(serde_json::to_value(logs).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        "publish_event" => {
            let req = p::<PublishEventParams>(params)?;
            let envelope = handler.publish_event(req.topic, req.data);
            Ok(serde_json::to_value(envelope).map_err(|e| ProtocolError::Internal(e.to_string()))?)
        }
        other => Err(ProtocolError::Malformed(format!("unknown method: {other}"))),
    }
}

async fn rpc_handler(State(handler): State<Arc<TaskGuildHandler>>, Json(request): Json<Value>) -> Json<Value> {
    let id = request.get("id").cloned();
    let method = match request.get("method").and_then(Value::as_str) {
        Some(method) => method,
        None => {
            let error = ProtocolError::Malformed("missing or invalid 'method' field".to_string());
            return Json(error.to_json_rpc_error(id));
        }
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    info!(method, "rpc request");
    match execute_method(&handler, method, params).await {
        Ok(result) => Json(success_response(id, result)),
        Err(err) => Json(err.to_json_rpc_error(id)),
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

fn sse_event(value: &impl serde::Serialize) -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default().data(serde_json::to_string(value).unwrap_or_default()))
}

async fn watch_process_handler(
    State(handler): State<Arc<TaskGuildHandler>>,
    Path((task_id, process_name)): Path<(String, String)>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (_id, rx) = handler.watch_process(&task_id, &process_name);
    let stream = ReceiverStream::new(rx).map(|event| sse_event(&event));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("ping"))
}

async fn subscribe_interactions_handler(
    State(handler): State<Arc<TaskGuildHandler>>,
    Path(task_id): Path<String>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = handler.subscribe_interactions(&task_id);
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(|event| event.ok()).map(|event| sse_event(&event));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("ping"))
}

#[derive(Debug, Deserialize)]
struct SubscribeEventsQuery {
    topic: Option<String>,
}

async fn subscribe_events_handler(
    State(handler): State<Arc<TaskGuildHandler>>,
    Query(query): Query<SubscribeEventsQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    // The event log has no live-push channel of its own; a poll loop over the
    // same bounded buffer `GetEventLogs` reads is enough for an operator
    // console without adding a second broadcast channel just for this.
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    tokio::spawn(async move {
        let mut last_len = 0usize;
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let entries = handler.get_event_logs(query.topic.as_deref(), None);
            if entries.len() > last_len {
                for entry in &entries[last_len..] {
                    if tx.send(entry.clone()).await.is_err() {
                        return;
                    }
                }
            }
            last_len = entries.len();
        }
    });
    let stream = ReceiverStream::new(rx).map(|event| sse_event(&event));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("ping"))
}
