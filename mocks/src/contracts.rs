//! Contract test helpers for validating trait implementations
//!
//! Provides standardized tests that any implementation of [`TaskRepository`]
//! should pass, ensuring consistent behavior across different implementations.

use task_core::{TaskError, TaskRepository, TaskStatus};

use crate::builders::{TaskBuilder, TaskFilterBuilder, UpdateTaskBuilder};
use crate::generators::sample_task;

/// Run the full contract suite against a [`TaskRepository`] implementation.
pub async fn test_repository_contract<R: TaskRepository>(repo: &R) {
    test_create_contract(repo).await;
    test_save_contract(repo).await;
    test_update_contract(repo).await;
    test_get_contract(repo).await;
    test_list_contract(repo).await;
    test_health_check_contract(repo).await;
    test_stats_contract(repo).await;
}

/// Test task creation contract.
pub async fn test_create_contract<R: TaskRepository>(repo: &R) {
    let new_task = TaskBuilder::new().with_id("CREATE-TEST").build();
    let task = repo.create(new_task.clone()).await.expect("create should succeed");

    assert_eq!(task.id, new_task.id, "created task should preserve id");
    assert_eq!(task.title, new_task.title, "created task should preserve title");

    let duplicate = sample_task(&task.id, &task.task_type);
    let duplicate_result = repo.create(duplicate).await;
    assert!(duplicate_result.is_err(), "should reject a duplicate id");
    match duplicate_result.unwrap_err() {
        TaskError::Validation(_) => {}
        other => panic!("expected Validation error, got: {other:?}"),
    }
}

/// Test the save (full-overwrite) contract.
pub async fn test_save_contract<R: TaskRepository>(repo: &R) {
    let task = sample_task("SAVE-TEST", "feature");
    repo.create(task.clone()).await.expect("create should succeed");

    let mut updated = task.clone();
    updated.title = "Saved Title".to_string();
    repo.save(&updated).await.expect("save should succeed for a known id");

    let fetched = repo.get(&task.id).await.expect("get should succeed").expect("task should exist");
    assert_eq!(fetched.title, "Saved Title");

    let unknown = TaskBuilder::new().with_id("SAVE-UNKNOWN").build();
    let result = repo.save(&unknown).await;
    assert!(result.is_err(), "should fail to save an unknown id");
    match result.unwrap_err() {
        TaskError::NotFound(_) => {}
        other => panic!("expected NotFound error, got: {other:?}"),
    }
}

/// Test the metadata-only update contract.
pub async fn test_update_contract<R: TaskRepository>(repo: &R) {
    let task = sample_task("UPDATE-TEST", "feature");
    repo.create(task.clone()).await.expect("create should succeed");

    let update = UpdateTaskBuilder::new().with_title("Updated Name").with_description("Updated Description").build();

    let updated_task = repo.update(&task.id, update).await.expect("update should succeed");
    assert_eq!(updated_task.title, "Updated Name");
    assert_eq!(updated_task.description, "Updated Description");
    assert_eq!(updated_task.id, task.id, "id should remain unchanged");

    let update_result = repo.update("NONEXISTENT-ID", UpdateTaskBuilder::new().build()).await;
    assert!(update_result.is_err(), "should fail to update a non-existent task");
    match update_result.unwrap_err() {
        TaskError::NotFound(_) => {}
        other => panic!("expected NotFound error, got: {other:?}"),
    }
}

/// Test get-by-id contract.
pub async fn test_get_contract<R: TaskRepository>(repo: &R) {
    let task = sample_task("GET-TEST", "feature");
    repo.create(task.clone()).await.expect("create should succeed");

    let retrieved = repo.get(&task.id).await.expect("get should succeed").expect("task should exist");
    assert_eq!(retrieved.id, task.id);

    let not_found = repo.get("NON-EXISTENT").await.expect("get should not error for an unknown id");
    assert!(not_found.is_none(), "should return None for a non-existent id");
}

/// Test list/filter contract.
pub async fn test_list_contract<R: TaskRepository>(repo: &R) {
    let tasks = vec![sample_task("LIST-1", "feature"), sample_task("LIST-2", "bugfix"), sample_task("LIST-3", "feature")];
    for task in tasks {
        repo.create(task).await.expect("create should succeed");
    }

    let all_tasks = repo.list(TaskFilterBuilder::new().build()).await.expect("list all should succeed");
    assert!(all_tasks.len() >= 3, "should contain at least our created tasks");

    let features = repo
        .list(TaskFilterBuilder::new().with_task_type("feature").build())
        .await
        .expect("filter by task type should succeed");
    assert!(features.iter().all(|t| t.task_type == "feature"), "all returned tasks should be of type 'feature'");

    let pending = repo
        .list(TaskFilterBuilder::new().with_status(TaskStatus::Pending).build())
        .await
        .expect("filter by status should succeed");
    assert!(pending.iter().all(|t| t.status() == TaskStatus::Pending), "all returned tasks should be Pending");
}

/// Test health check contract.
pub async fn test_health_check_contract<R: TaskRepository>(repo: &R) {
    repo.health_check().await.expect("health check should succeed for a working repository");
}

/// Test statistics contract.
pub async fn test_stats_contract<R: TaskRepository>(repo: &R) {
    repo.create(sample_task("STATS-TEST", "feature")).await.expect("create should succeed");

    let stats = repo.get_stats().await.expect("get stats should succeed");
    assert!(stats.total_tasks > 0, "should report at least one task");
    assert!(stats.latest_created.is_some(), "should have a latest creation timestamp");
}
