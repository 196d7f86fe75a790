//! Wire messages exchanged with the browser over `/` (the daemon's only
//! WebSocket route), grounded 1:1 on
//! `original_source/src/kira/agent/daemon.py`'s JSON message shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::daemon::DaemonLifecycleState;

/// Stable error codes the browser client matches on. Kept as named
/// constants rather than inlined strings so every call site agrees on the
/// exact spelling.
pub mod error_code {
    pub const MISSING_FIELDS: &str = "missing_fields";
    pub const REGISTRATION_FAILED: &str = "registration_failed";
    pub const INVALID_JSON: &str = "invalid_json";
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Activate {
        session_id: String,
        token: String,
        server_url: String,
    },
    Deactivate {
        session_id: String,
    },
    Ping,
    PickDirectory {
        request_id: String,
        #[serde(default)]
        initial_dir: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Status {
        state: DaemonLifecycleState,
        worker_id: Option<Uuid>,
        server_url: Option<String>,
        running_tasks: usize,
        uptime_seconds: u64,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
    DirectoryPicked {
        request_id: String,
        path: String,
        cancelled: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    UpgradeAvailable {
        current_version: String,
        server_version: String,
        install_url: String,
    },
}

impl OutgoingMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        OutgoingMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
