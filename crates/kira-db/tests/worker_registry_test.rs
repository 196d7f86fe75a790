//! Worker registration, polling, and the staleness sweep's failover path.

use chrono::{Duration, Utc};
use kira_core::types::{Task, TaskPayload, TaskStatus, TaskType, WorkerStatus};
use kira_db::{workers, TaskStore};
use uuid::Uuid;

/// *P6* Re-registering a worker for the same user returns the same
/// `worker_id`.
#[tokio::test]
async fn reregistering_the_same_user_returns_the_same_worker_id() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let user_id = Uuid::new_v4();

    let first = workers::register_worker(&store, user_id, "host-a".to_string(), "0.1.0".to_string(), vec![])
        .await
        .unwrap();
    let second = workers::register_worker(&store, user_id, "host-a".to_string(), "0.2.0".to_string(), vec![])
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.version, "0.2.0", "re-registration updates the stored version in place");
}

#[tokio::test]
async fn different_users_get_different_worker_ids() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let a = workers::register_worker(&store, Uuid::new_v4(), "host-a".to_string(), "0.1.0".to_string(), vec![])
        .await
        .unwrap();
    let b = workers::register_worker(&store, Uuid::new_v4(), "host-b".to_string(), "0.1.0".to_string(), vec![])
        .await
        .unwrap();
    assert_ne!(a.id, b.id);
}

/// *P9* Poll returns zero tasks when none are `pending` for the user, never
/// an error.
#[tokio::test]
async fn poll_on_an_empty_board_returns_an_empty_list_not_an_error() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let tasks = store.poll_tasks(Uuid::new_v4(), 10).await.unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn poll_only_returns_tasks_assigned_to_the_polling_user() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner = Uuid::new_v4();
    let someone_else = Uuid::new_v4();

    let mut task = Task::new(Uuid::new_v4(), TaskType::AgentRun, TaskPayload::AgentRun);
    task.assigned_to = Some(owner);
    store.create_task(&task).await.unwrap();

    assert!(store.poll_tasks(someone_else, 10).await.unwrap().is_empty());
    assert_eq!(store.poll_tasks(owner, 10).await.unwrap().len(), 1);
}

/// *P4* / *S4 — worker failover.* Once a worker's heartbeat is older than
/// the offline threshold, the staleness sweep marks it `offline` and fails
/// every task it still held in `{claimed, running}`.
#[tokio::test]
async fn stale_worker_sweep_fails_its_in_flight_tasks() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let worker = workers::register_worker(&store, Uuid::new_v4(), "host-a".to_string(), "0.1.0".to_string(), vec![])
        .await
        .unwrap();

    let task = store
        .create_task(&Task::new(Uuid::new_v4(), TaskType::AgentRun, TaskPayload::AgentRun))
        .await
        .unwrap();
    store.claim_task(task.id, worker.id).await.unwrap();
    store.update_progress(task.id, None, None, None, None).await.unwrap();

    let long_ago = Utc::now() - Duration::seconds(workers::WORKER_OFFLINE_SECS + 60);
    store.set_worker_heartbeat_at(worker.id, long_ago).await.unwrap();

    workers::sweep_stale_workers(&store).await.unwrap();

    let reloaded_worker = store.get_worker(worker.id).await.unwrap().unwrap();
    assert_eq!(reloaded_worker.status, WorkerStatus::Offline);

    let reloaded_task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(reloaded_task.status, TaskStatus::Failed);
}

#[tokio::test]
async fn worker_stale_but_not_offline_keeps_its_tasks_running() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let worker = workers::register_worker(&store, Uuid::new_v4(), "host-a".to_string(), "0.1.0".to_string(), vec![])
        .await
        .unwrap();

    let task = store
        .create_task(&Task::new(Uuid::new_v4(), TaskType::AgentRun, TaskPayload::AgentRun))
        .await
        .unwrap();
    store.claim_task(task.id, worker.id).await.unwrap();
    store.update_progress(task.id, None, None, None, None).await.unwrap();

    let barely_stale = Utc::now() - Duration::seconds(workers::WORKER_STALE_SECS + 5);
    store.set_worker_heartbeat_at(worker.id, barely_stale).await.unwrap();

    workers::sweep_stale_workers(&store).await.unwrap();

    let reloaded_worker = store.get_worker(worker.id).await.unwrap().unwrap();
    assert_eq!(reloaded_worker.status, WorkerStatus::Stale);

    let reloaded_task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(reloaded_task.status, TaskStatus::Running);
}

#[tokio::test]
async fn heartbeat_surfaces_cancelled_tasks_as_directives() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let worker = workers::register_worker(&store, Uuid::new_v4(), "host-a".to_string(), "0.1.0".to_string(), vec![])
        .await
        .unwrap();

    let task = store
        .create_task(&Task::new(Uuid::new_v4(), TaskType::AgentRun, TaskPayload::AgentRun))
        .await
        .unwrap();
    store.claim_task(task.id, worker.id).await.unwrap();
    store.cancel_task(task.id).await.unwrap();

    let result = workers::heartbeat(&store, worker.id, &[task.id], 0.0).await.unwrap();
    assert_eq!(result.directives.cancel_task_ids, vec![task.id]);
}
