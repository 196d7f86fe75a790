//! Worker registration, heartbeat, and the staleness sweep.

use chrono::Utc;
use kira_core::types::{Worker, WorkerStatus};
use uuid::Uuid;

use crate::store::StoreError;
use crate::TaskStore;

/// *T_stale*: a worker not heard from in this many seconds is marked `stale`.
pub const WORKER_STALE_SECS: i64 = 90;
/// *T_offline*: a worker not heard from in this many seconds is marked
/// `offline` and every task it held in `{claimed, running}` is failed.
pub const WORKER_OFFLINE_SECS: i64 = 300;

#[derive(Debug, Default, Clone)]
pub struct Directives {
    pub cancel_task_ids: Vec<Uuid>,
    pub max_concurrent_tasks: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HeartbeatResult {
    pub status: WorkerStatus,
    pub directives: Directives,
}

/// Upsert-by-user registration; re-registering the same user always
/// returns the same `worker_id`.
pub async fn register_worker(
    store: &TaskStore,
    user_id: Uuid,
    hostname: String,
    version: String,
    capabilities: Vec<String>,
) -> Result<Worker, StoreError> {
    store
        .upsert_worker(user_id, hostname, version, capabilities)
        .await
}

/// `heartbeat(worker_id, running_task_ids, system_load) -> {status, directives}`.
pub async fn heartbeat(
    store: &TaskStore,
    worker_id: Uuid,
    running_task_ids: &[Uuid],
    _system_load: f64,
) -> Result<HeartbeatResult, StoreError> {
    store.touch_worker_heartbeat(worker_id).await?;
    let cancel_task_ids = store.tasks_cancelled_among(running_task_ids).await?;
    Ok(HeartbeatResult {
        status: WorkerStatus::Online,
        directives: Directives {
            cancel_task_ids,
            max_concurrent_tasks: None,
        },
    })
}

/// Demotes workers whose heartbeat has aged past *T_stale*/*T_offline*,
/// failing every in-flight task of a worker that just went offline.
pub async fn sweep_stale_workers(store: &TaskStore) -> Result<(), StoreError> {
    let now = Utc::now();
    for worker in store.list_workers().await? {
        let age_secs = (now - worker.last_heartbeat).num_seconds();
        if age_secs >= WORKER_OFFLINE_SECS {
            if worker.status != WorkerStatus::Offline {
                store
                    .set_worker_status(worker.id, WorkerStatus::Offline)
                    .await?;
                store
                    .fail_tasks_for_worker(worker.id, "worker went offline")
                    .await?;
            }
        } else if age_secs >= WORKER_STALE_SECS {
            if worker.status == WorkerStatus::Online {
                store
                    .set_worker_status(worker.id, WorkerStatus::Stale)
                    .await?;
            }
        }
    }
    Ok(())
}
