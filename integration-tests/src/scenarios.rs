//! End-to-end scenarios exercised against a live `taskguild` daemon.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::harness::TaskGuildHarness;

/// Read a process's `status` out of a serialized task. The wire format has
/// no derived `status` field, so scenarios assert against individual
/// process states instead.
fn process_status<'a>(task: &'a Value, process: &str) -> Option<&'a str> {
    task.get("process_states")?.get(process)?.get("status")?.as_str()
}

/// Run every scenario in sequence, in the order a realistic daemon
/// lifecycle exercises them: task creation, process acquisition, rejection
/// and retry, interactions, and the event log.
pub async fn run_all(harness: &mut TaskGuildHarness) -> Result<()> {
    task_lifecycle(harness).await?;
    process_acquisition_and_completion(harness).await?;
    process_rejection_resets_dependents(harness).await?;
    interactions_round_trip(harness).await?;
    event_log_round_trip(harness).await?;
    Ok(())
}

fn unique_task_id(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..8])
}

/// create_task -> get_task -> update_task -> list_tasks.
async fn task_lifecycle(h: &mut TaskGuildHarness) -> Result<()> {
    info!("scenario: task_lifecycle");
    let task_id = unique_task_id("LIFECYCLE");

    let created = h
        .call(
            "create_task",
            json!({"id": task_id, "title": "Integration task", "description": "Created by the integration harness", "task_type": "feature"}),
        )
        .await?;
    assert_eq!(created.get("id").and_then(|v| v.as_str()), Some(task_id.as_str()));

    let fetched = h.call("get_task", json!({"task_id": task_id})).await?;
    assert_eq!(fetched.get("title").and_then(|v| v.as_str()), Some("Integration task"));

    let updated = h.call("update_task", json!({"task_id": task_id, "title": "Renamed task"})).await?;
    assert_eq!(updated.get("title").and_then(|v| v.as_str()), Some("Renamed task"));

    let listed = h.call("list_tasks", json!({"task_type": "feature"})).await?;
    let tasks = listed.as_array().context("list_tasks should return an array")?;
    assert!(tasks.iter().any(|t| t.get("id").and_then(|v| v.as_str()) == Some(task_id.as_str())));

    Ok(())
}

/// try_acquire_process -> complete_process unlocks dependents -> close_task.
async fn process_acquisition_and_completion(h: &mut TaskGuildHarness) -> Result<()> {
    info!("scenario: process_acquisition_and_completion");
    let task_id = unique_task_id("ACQUIRE");
    h.call("create_task", json!({"id": task_id, "title": "Acquire flow", "description": "d", "task_type": "feature"})).await?;

    let available = h.call("get_available_processes", json!({"process_name": "implement"})).await?;
    let available_ids: Vec<&str> =
        available.as_array().context("expected array")?.iter().filter_map(|v| v.get("task_id").and_then(|id| id.as_str())).collect();
    assert!(available_ids.contains(&task_id.as_str()));

    h.call("try_acquire_process", json!({"task_id": task_id, "process_name": "implement", "agent_id": "agent-int-1"})).await?;

    let second_attempt = h.call("try_acquire_process", json!({"task_id": task_id, "process_name": "implement", "agent_id": "agent-int-2"})).await;
    assert!(second_attempt.is_err(), "a second agent should not be able to acquire a held process");

    h.call("complete_process", json!({"task_id": task_id, "process_name": "implement", "agent_id": "agent-int-1"})).await?;

    h.call("try_acquire_process", json!({"task_id": task_id, "process_name": "review", "agent_id": "agent-int-3"})).await?;
    h.call("complete_process", json!({"task_id": task_id, "process_name": "review", "agent_id": "agent-int-3"})).await?;
    h.call("try_acquire_process", json!({"task_id": task_id, "process_name": "qa", "agent_id": "agent-int-4"})).await?;
    h.call("complete_process", json!({"task_id": task_id, "process_name": "qa", "agent_id": "agent-int-4"})).await?;

    let closed = h.call("close_task", json!({"task_id": task_id})).await?;
    for process in ["implement", "review", "qa"] {
        assert_eq!(process_status(&closed, process), Some("completed"), "process '{process}' should be completed once the task is closed");
    }

    Ok(())
}

/// reject_process resets the transitive dependents of the rejected process
/// (the process itself stays `rejected`, its dependents go back to `pending`).
async fn process_rejection_resets_dependents(h: &mut TaskGuildHarness) -> Result<()> {
    info!("scenario: process_rejection_resets_dependents");
    let task_id = unique_task_id("REJECT");
    h.call("create_task", json!({"id": task_id, "title": "Reject flow", "description": "d", "task_type": "feature"})).await?;

    h.call("try_acquire_process", json!({"task_id": task_id, "process_name": "implement", "agent_id": "agent-rej-1"})).await?;
    let rejection = h
        .call(
            "reject_process",
            json!({"task_id": task_id, "process_name": "implement", "agent_id": "agent-rej-1", "reason": "needs another pass"}),
        )
        .await?;
    let reset: Vec<&str> = rejection
        .get("reset_processes")
        .and_then(|v| v.as_array())
        .context("reject_process should report reset_processes")?
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(reset.contains(&"review"), "review depends on implement and should be reset");
    assert!(reset.contains(&"qa"), "qa depends on implement and should be reset");

    let task = h.call("get_task", json!({"task_id": task_id})).await?;
    assert_eq!(process_status(&task, "implement"), Some("rejected"));
    assert_eq!(process_status(&task, "review"), Some("pending"));
    assert_eq!(process_status(&task, "qa"), Some("pending"));

    Ok(())
}

/// create_interaction -> respond_interaction -> get_interaction_response.
async fn interactions_round_trip(h: &mut TaskGuildHarness) -> Result<()> {
    info!("scenario: interactions_round_trip");
    let task_id = unique_task_id("INTERACT");
    h.call("create_task", json!({"id": task_id, "title": "Interaction flow", "description": "d", "task_type": "feature"})).await?;

    let interaction = h
        .call(
            "create_interaction",
            json!({
                "id": unique_task_id("IX"),
                "task_id": task_id,
                "agent_id": "agent-ix-1",
                "kind": "question",
                "title": "Should this touch the public API?",
                "description": "Asking before widening a trait signature.",
            }),
        )
        .await?;
    let interaction_id = interaction.get("id").and_then(|v| v.as_str()).context("interaction should have an id")?.to_string();

    h.call("respond_interaction", json!({"interaction_id": interaction_id, "response": "Yes, go ahead"})).await?;

    let resolved = h.call("get_interaction_response", json!({"interaction_id": interaction_id})).await?;
    assert!(resolved.get("response").is_some(), "interaction should carry a response after answering");

    Ok(())
}

/// publish_event -> get_event_logs reflects the externally published envelope.
async fn event_log_round_trip(h: &mut TaskGuildHarness) -> Result<()> {
    info!("scenario: event_log_round_trip");
    let topic = "integration.smoke";
    let published = h.call("publish_event", json!({"topic": topic, "data": {"note": "integration smoke test"}})).await?;
    assert_eq!(published.get("type").and_then(|v| v.as_str()), Some(topic));

    let logs = h.call("get_event_logs", json!({"topic": topic})).await?;
    let entries = logs.as_array().context("get_event_logs should return an array")?;
    assert!(!entries.is_empty(), "the just-published event should appear in its own topic's log");

    Ok(())
}
