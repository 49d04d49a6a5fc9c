//! Integration tests for the mocks crate
//!
//! Tests the mock implementations and utilities to ensure they work correctly
//! and provide the expected testing capabilities.

use mocks::*;
use task_core::{TaskError, TaskRepository, TaskStatus};

#[tokio::test]
async fn test_mock_repository_basic_operations() {
    let repo = MockTaskRepository::new();

    let new_task = create_test_task();
    let task = repo.create(new_task.clone()).await.unwrap();

    assert_eq!(task.id, new_task.id);
    assert_eq!(task.status(), TaskStatus::Pending);

    repo.assert_called("create");

    let retrieved = repo.get(&task.id).await.unwrap().unwrap();
    assert_eq!(retrieved.id, task.id);

    repo.assert_called("get");
}

#[tokio::test]
async fn test_mock_repository_error_injection() {
    let repo = MockTaskRepository::new();

    repo.inject_error(TaskError::Internal("test error".to_string()));

    let result = repo.get("T1").await;
    assert!(result.is_err());
    assert!(matches!(result.unwrap_err(), TaskError::Internal(_)));

    let result = repo.get("T1").await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_mock_repository_save_and_update() {
    let repo = MockTaskRepository::new();

    let task = create_test_task();
    repo.create(task.clone()).await.unwrap();

    let mut saved = task.clone();
    saved.title = "Reassigned".to_string();
    repo.save(&saved).await.unwrap();

    let fetched = repo.get(&task.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Reassigned");

    let result = repo.update(&task.id, create_update_task()).await.unwrap();
    assert_eq!(result.title, "Updated Task Name");

    let not_found = repo.update("NONEXISTENT", create_update_task()).await;
    assert!(matches!(not_found, Err(TaskError::NotFound(_))));
}

#[tokio::test]
async fn test_fixtures_create_tasks_in_all_states() {
    let tasks = create_tasks_in_all_states();

    assert_eq!(tasks.len(), 4);

    let statuses: Vec<_> = tasks.iter().map(|t| t.status()).collect();
    assert!(statuses.contains(&TaskStatus::Pending));
    assert!(statuses.contains(&TaskStatus::InProgress));
    assert!(statuses.contains(&TaskStatus::Rejected));
    assert!(statuses.contains(&TaskStatus::Closed));
}

#[tokio::test]
async fn test_builders_task_builder() {
    let task = TaskBuilder::new()
        .with_id("BUILD-001")
        .with_title("Built Task")
        .with_status(TaskStatus::InProgress)
        .build();

    assert_eq!(task.id, "BUILD-001");
    assert_eq!(task.title, "Built Task");
    assert_eq!(task.status(), TaskStatus::InProgress);
}

#[tokio::test]
async fn test_assertions_task_equals() {
    let task1 = create_test_task();
    let mut task2 = task1.clone();

    assert_task_equals(&task1, &task2);

    task2.title = "Different Title".to_string();

    let result = std::panic::catch_unwind(|| {
        assert_task_equals(&task1, &task2);
    });
    assert!(result.is_err());
}

#[tokio::test]
async fn test_assertions_process_state_invariant() {
    assert_process_state_valid(&task_core::models::ProcessState::pending());
    assert_process_state_valid(&task_core::models::ProcessState::in_progress("agent-1"));

    let task = create_test_task_with_status(TaskStatus::InProgress);
    assert_task_process_states_consistent(&task);
}

#[tokio::test]
async fn test_generators_realistic_data() {
    let task = generate_random_task();

    assert!(!task.id.is_empty());
    assert!(!task.title.is_empty());
    assert!(!task.description.is_empty());
    assert!(!task.task_type.is_empty());
}

#[tokio::test]
async fn test_mock_repository_concurrent_access() {
    use std::sync::Arc;
    use tokio::task::JoinSet;

    let repo = Arc::new(MockTaskRepository::new());
    let mut set = JoinSet::new();

    for i in 0..10 {
        let repo_clone = repo.clone();
        set.spawn(async move {
            let new_task = TaskBuilder::new().with_id(format!("CONCURRENT-{i:03}")).with_title(format!("Concurrent Task {i}")).build();

            repo_clone.create(new_task).await.unwrap()
        });
    }

    let mut tasks = Vec::new();
    while let Some(result) = set.join_next().await {
        tasks.push(result.unwrap());
    }

    assert_eq!(tasks.len(), 10);

    let mut ids: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn test_mock_repository_stats() {
    let tasks = create_tasks_in_all_states();
    let repo_with_tasks = MockTaskRepository::with_tasks(tasks);

    let stats = repo_with_tasks.get_stats().await.unwrap();

    assert_eq!(stats.total_tasks, 4);
    assert_eq!(stats.closed_tasks, 1);
    assert_eq!(stats.rejected_tasks, 1);
    assert!(stats.latest_created.is_some());
}

#[tokio::test]
async fn test_contract_tests_with_mock() {
    let repo = MockTaskRepository::new();

    test_repository_contract(&repo).await;

    let history = repo.call_history();
    assert!(!history.is_empty(), "mock should have recorded method calls");
    assert!(history.iter().any(|call| call.contains("create")), "should have called create");
    assert!(history.iter().any(|call| call.contains("get")), "should have called get");
}
