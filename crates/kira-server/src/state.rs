//! Shared application state for every HTTP/WS handler.

use std::sync::Arc;

use kira_api_types::{TaskEvent, WorkerEvent};
use kira_db::TaskStore;

use crate::auth::TokenStore;
use crate::event_bus::EventBus;

/// State threaded through every route via axum's `State` extractor.
///
/// `store` is the sole owner of persisted state (boards/columns/cards/
/// tasks/workers); `tokens` and the two event buses are server-process-
/// local and rebuilt on every restart — sessions and live-event fan-out
/// are treated as non-durable.
pub struct ApiState {
    pub store: Arc<TaskStore>,
    pub tokens: TokenStore,
    pub task_events: EventBus<TaskEvent>,
    pub worker_events: EventBus<WorkerEvent>,
    pub start_time: std::time::Instant,
    /// Extra WebSocket origins allowed on top of the built-in localhost
    /// variants, sourced from `ServerConfig::allowed_origins`.
    pub allowed_origins: Vec<String>,
}

impl ApiState {
    pub fn new(store: Arc<TaskStore>, allowed_origins: Vec<String>) -> Self {
        Self {
            store,
            tokens: TokenStore::new(),
            task_events: EventBus::new(),
            worker_events: EventBus::new(),
            start_time: std::time::Instant::now(),
            allowed_origins,
        }
    }
}
