//! Claim CAS: the sole inter-worker synchronization primitive.

use kira_core::types::{Task, TaskPayload, TaskType};
use kira_db::TaskStore;
use uuid::Uuid;

fn make_task(board_id: Uuid) -> Task {
    Task::new(board_id, TaskType::AgentRun, TaskPayload::AgentRun)
}

#[tokio::test]
async fn claim_transitions_pending_to_claimed() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let task = store.create_task(&make_task(Uuid::new_v4())).await.unwrap();
    let worker_id = Uuid::new_v4();

    let claimed = store.claim_task(task.id, worker_id).await.unwrap();
    assert_eq!(claimed.worker_id, Some(worker_id));
    assert_eq!(claimed.status, kira_core::types::TaskStatus::Claimed);
}

#[tokio::test]
async fn second_claim_of_the_same_task_is_rejected() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let task = store.create_task(&make_task(Uuid::new_v4())).await.unwrap();
    let first_worker = Uuid::new_v4();
    let second_worker = Uuid::new_v4();

    store.claim_task(task.id, first_worker).await.unwrap();
    let err = store.claim_task(task.id, second_worker).await.unwrap_err();
    assert!(matches!(err, kira_db::StoreError::AlreadyClaimed(id) if id == task.id));

    // The original claim is undisturbed.
    let row = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(row.worker_id, Some(first_worker));
}

#[tokio::test]
async fn claiming_a_nonexistent_task_is_rejected_not_panicked() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let err = store.claim_task(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, kira_db::StoreError::AlreadyClaimed(_)));
}

#[tokio::test]
async fn many_concurrent_claims_only_one_succeeds() {
    let store = std::sync::Arc::new(TaskStore::new_in_memory().await.unwrap());
    let task = store.create_task(&make_task(Uuid::new_v4())).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let task_id = task.id;
        handles.push(tokio::spawn(async move {
            store.claim_task(task_id, Uuid::new_v4()).await
        }));
    }

    let mut ok_count = 0;
    for h in handles {
        if h.await.unwrap().is_ok() {
            ok_count += 1;
        }
    }
    assert_eq!(ok_count, 1);
}
