//! The task store: a `tokio_rusqlite`-backed, WAL-mode SQLite database
//! holding boards, columns, cards, tasks, and workers.
//!
//! Every multi-statement mutation (`complete_task`, `fail_task`, `create_task`
//! with a card mirror update) runs inside a single `rusqlite::Transaction`
//! built from one `conn.call(move |conn| ...)` closure, so the whole
//! operation either commits or doesn't, including the card-mirroring side
//! effects of the completion cascade.

use std::path::Path;

use chrono::{DateTime, Utc};
use kira_core::types::{
    AgentStatus, Board, BoardSettings, Card, Column, GitLabBoardSettings, Task, TaskPayload,
    TaskStatus, TaskType, Worker, WorkerStatus, WorkspaceBoardSettings,
};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::automation;

pub struct TaskStore {
    conn: Connection,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("task {0} already claimed")]
    AlreadyClaimed(Uuid),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Outcome of a terminal task transition: any follow-on tasks the cascade
/// enqueued, and the column the card ended up in (if any).
#[derive(Debug, Default)]
pub struct CascadeOutcome {
    pub new_tasks: Vec<Task>,
    pub card_moved_to: Option<Uuid>,
}

impl TaskStore {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;
                    PRAGMA foreign_keys=ON;

                    CREATE TABLE IF NOT EXISTS boards (
                        id           TEXT PRIMARY KEY,
                        owner_id     TEXT NOT NULL,
                        name         TEXT NOT NULL,
                        description  TEXT NOT NULL DEFAULT '',
                        settings_json TEXT NOT NULL DEFAULT '{}'
                    );

                    CREATE TABLE IF NOT EXISTS columns (
                        id                   TEXT PRIMARY KEY,
                        board_id             TEXT NOT NULL,
                        name                 TEXT NOT NULL,
                        position             INTEGER NOT NULL DEFAULT 0,
                        auto_run             INTEGER NOT NULL DEFAULT 0,
                        agent_type           TEXT,
                        agent_model          TEXT,
                        agent_skill          TEXT,
                        prompt_template      TEXT,
                        max_loop_count       INTEGER NOT NULL DEFAULT 3,
                        on_success_column_id TEXT,
                        on_failure_column_id TEXT
                    );
                    CREATE INDEX IF NOT EXISTS idx_columns_board ON columns(board_id);

                    CREATE TABLE IF NOT EXISTS cards (
                        id           TEXT PRIMARY KEY,
                        board_id     TEXT NOT NULL,
                        column_id    TEXT NOT NULL,
                        position     INTEGER NOT NULL DEFAULT 0,
                        title        TEXT NOT NULL,
                        description  TEXT NOT NULL DEFAULT '',
                        priority     TEXT NOT NULL DEFAULT 'medium',
                        labels_json  TEXT NOT NULL DEFAULT '[]',
                        assignee_id  TEXT,
                        agent_status TEXT NOT NULL DEFAULT ''
                    );
                    CREATE INDEX IF NOT EXISTS idx_cards_column ON cards(column_id);
                    CREATE INDEX IF NOT EXISTS idx_cards_board  ON cards(board_id);

                    CREATE TABLE IF NOT EXISTS tasks (
                        id                 TEXT PRIMARY KEY,
                        board_id           TEXT NOT NULL,
                        card_id            TEXT,
                        task_type          TEXT NOT NULL,
                        status             TEXT NOT NULL,
                        agent_type         TEXT,
                        agent_model        TEXT,
                        agent_skill        TEXT,
                        prompt_text        TEXT,
                        payload_json       TEXT NOT NULL DEFAULT '{}',
                        source_column_id   TEXT,
                        target_column_id   TEXT,
                        failure_column_id  TEXT,
                        priority           INTEGER NOT NULL DEFAULT 0,
                        created_by         TEXT,
                        assigned_to        TEXT,
                        worker_id          TEXT,
                        progress_text      TEXT,
                        step               INTEGER,
                        total_steps        INTEGER,
                        phase              TEXT,
                        output_text        TEXT,
                        error_summary      TEXT,
                        result_data_json   TEXT,
                        created_at         TEXT NOT NULL,
                        started_at         TEXT,
                        completed_at       TEXT
                    );
                    CREATE INDEX IF NOT EXISTS idx_tasks_status     ON tasks(status);
                    CREATE INDEX IF NOT EXISTS idx_tasks_assigned   ON tasks(assigned_to, status);
                    CREATE INDEX IF NOT EXISTS idx_tasks_card_col   ON tasks(card_id, source_column_id);
                    CREATE INDEX IF NOT EXISTS idx_tasks_worker     ON tasks(worker_id, status);

                    CREATE TABLE IF NOT EXISTS workers (
                        id               TEXT PRIMARY KEY,
                        user_id          TEXT NOT NULL UNIQUE,
                        hostname         TEXT NOT NULL,
                        version          TEXT NOT NULL,
                        status           TEXT NOT NULL,
                        last_heartbeat   TEXT NOT NULL,
                        capabilities_json TEXT NOT NULL DEFAULT '[]'
                    );
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Task CRUD / state machine
    // -----------------------------------------------------------------------

    pub async fn create_task(&self, task: &Task) -> Result<Task, StoreError> {
        let task = task.clone();
        let out = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                insert_task(&tx, &task)?;
                if let Some(card_id) = task.card_id {
                    tx.execute(
                        "UPDATE cards SET agent_status=?1 WHERE id=?2",
                        params![AgentStatus::Pending.as_str(), card_id.to_string()],
                    )?;
                }
                tx.commit()?;
                Ok(task)
            })
            .await?;
        Ok(out)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let id_s = id.to_string();
        let task = self
            .conn
            .call(move |conn| fetch_task(conn, &id_s))
            .await?;
        Ok(task)
    }

    /// Claim CAS: the sole inter-worker synchronization primitive.
    pub async fn claim_task(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, StoreError> {
        let task_id_s = task_id.to_string();
        let worker_id_s = worker_id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE tasks SET status='claimed', worker_id=?1 WHERE id=?2 AND status='pending'",
                    params![worker_id_s, task_id_s],
                )
            })
            .await?;
        if changed == 0 {
            return Err(StoreError::AlreadyClaimed(task_id));
        }
        self.get_task(task_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))
    }

    /// First report moves `claimed -> running` and stamps `started_at`;
    /// later reports only update the progress fields.
    pub async fn update_progress(
        &self,
        task_id: Uuid,
        progress_text: Option<String>,
        step: Option<i64>,
        total_steps: Option<i64>,
        phase: Option<String>,
    ) -> Result<(), StoreError> {
        let task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        let first_report = task.status == TaskStatus::Claimed;
        let task_id_s = task_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                if first_report {
                    conn.execute(
                        "UPDATE tasks SET status='running', started_at=?1, progress_text=?2,
                         step=?3, total_steps=?4, phase=?5 WHERE id=?6",
                        params![now, progress_text, step, total_steps, phase, task_id_s],
                    )?;
                } else {
                    conn.execute(
                        "UPDATE tasks SET progress_text=?1, step=?2, total_steps=?3, phase=?4
                         WHERE id=?5",
                        params![progress_text, step, total_steps, phase, task_id_s],
                    )?;
                }
                Ok(())
            })
            .await?;
        if let Some(card_id) = task.card_id {
            self.set_card_agent_status(card_id, AgentStatus::Running)
                .await?;
        }
        Ok(())
    }

    pub async fn complete_task(
        &self,
        task_id: Uuid,
        output_text: Option<String>,
        result_data: Option<serde_json::Value>,
    ) -> Result<CascadeOutcome, StoreError> {
        self.terminal_transition(task_id, TaskStatus::Completed, None, output_text, result_data)
            .await
    }

    pub async fn fail_task(
        &self,
        task_id: Uuid,
        error_summary: String,
        output_text: Option<String>,
    ) -> Result<CascadeOutcome, StoreError> {
        self.terminal_transition(
            task_id,
            TaskStatus::Failed,
            Some(error_summary),
            output_text,
            None,
        )
        .await
    }

    pub async fn cancel_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        let task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if task.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: task.status.as_str().into(),
                to: "cancelled".into(),
            });
        }
        let task_id_s = task_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE tasks SET status='cancelled' WHERE id=?1",
                    params![task_id_s],
                )
            })
            .await?;
        if let Some(card_id) = task.card_id {
            self.set_card_agent_status(card_id, AgentStatus::None)
                .await?;
        }
        Ok(())
    }

    /// Top-N pending tasks for `user_id`, ordered `(priority DESC, created_at ASC)`.
    pub async fn poll_tasks(&self, user_id: Uuid, limit: i64) -> Result<Vec<Task>, StoreError> {
        let user_id_s = user_id.to_string();
        let tasks = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT * FROM tasks WHERE status='pending' AND assigned_to=?1
                     ORDER BY priority DESC, created_at ASC LIMIT ?2",
                )?;
                let mut rows = stmt.query(params![user_id_s, limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_task(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(tasks)
    }

    /// Circuit breaker count for the automation trigger.
    pub async fn count_prior_tasks(
        &self,
        card_id: Uuid,
        source_column_id: Uuid,
    ) -> Result<i64, StoreError> {
        let card_id_s = card_id.to_string();
        let col_id_s = source_column_id.to_string();
        let n = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM tasks WHERE card_id=?1 AND source_column_id=?2",
                    params![card_id_s, col_id_s],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(n)
    }

    /// Every task claimed by `worker_id` still in `{claimed, running}` is
    /// failed with `"worker went offline"`, cascading each one.
    pub async fn fail_tasks_for_worker(
        &self,
        worker_id: Uuid,
        error_summary: &str,
    ) -> Result<Vec<CascadeOutcome>, StoreError> {
        let worker_id_s = worker_id.to_string();
        let ids: Vec<Uuid> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM tasks WHERE worker_id=?1 AND status IN ('claimed','running')",
                )?;
                let mut rows = stmt.query(params![worker_id_s])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let s: String = row.get(0)?;
                    out.push(Uuid::parse_str(&s).unwrap_or_default());
                }
                Ok(out)
            })
            .await?;

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            outcomes.push(
                self.fail_task(id, error_summary.to_string(), None)
                    .await?,
            );
        }
        Ok(outcomes)
    }

    /// Shared terminal-transition path for `complete_task`/`fail_task`, wrapping
    /// the status update and the completion cascade in one transaction.
    async fn terminal_transition(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        error_summary: Option<String>,
        output_text: Option<String>,
        result_data: Option<serde_json::Value>,
    ) -> Result<CascadeOutcome, StoreError> {
        let task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if !task.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: task.status.as_str().into(),
                to: status.as_str().into(),
            });
        }
        let task_id_s = task_id.to_string();
        let now = Utc::now();
        let now_s = now.to_rfc3339();
        let result_json = result_data.as_ref().map(|v| v.to_string());
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE tasks SET status=?1, output_text=?2, error_summary=?3,
                     result_data_json=?4, completed_at=?5 WHERE id=?6",
                    params![
                        status.as_str(),
                        output_text,
                        error_summary,
                        result_json,
                        now_s,
                        task_id_s,
                    ],
                )?;
                let outcome = automation::cascade::run(&tx, &task_id_s, now)?;
                tx.commit()?;
                Ok(outcome)
            })
            .await?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Board / Column / Card
    // -----------------------------------------------------------------------

    pub async fn create_board(&self, board: &Board) -> Result<Board, StoreError> {
        let board = board.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO boards (id, owner_id, name, description, settings_json)
                     VALUES (?1,?2,?3,?4,?5)",
                    params![
                        board.id.to_string(),
                        board.owner_id.to_string(),
                        board.name,
                        board.description,
                        serde_json::to_string(&board.settings).unwrap_or_default(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(board)
    }

    pub async fn get_board(&self, id: Uuid) -> Result<Option<Board>, StoreError> {
        let id_s = id.to_string();
        let board = self
            .conn
            .call(move |conn| fetch_board(conn, &id_s))
            .await?;
        Ok(board)
    }

    pub async fn update_board_settings(
        &self,
        board_id: Uuid,
        settings: &BoardSettings,
    ) -> Result<(), StoreError> {
        let board_id_s = board_id.to_string();
        let json = serde_json::to_string(settings).unwrap_or_default();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE boards SET settings_json=?1 WHERE id=?2",
                    params![json, board_id_s],
                )
            })
            .await?;
        Ok(())
    }

    pub async fn update_board_name_description(
        &self,
        board_id: Uuid,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<(), StoreError> {
        if name.is_none() && description.is_none() {
            return Ok(());
        }
        let board_id_s = board_id.to_string();
        self.conn
            .call(move |conn| {
                if let Some(name) = name {
                    conn.execute(
                        "UPDATE boards SET name=?1 WHERE id=?2",
                        params![name, board_id_s],
                    )?;
                }
                if let Some(description) = description {
                    conn.execute(
                        "UPDATE boards SET description=?1 WHERE id=?2",
                        params![description, board_id_s],
                    )?;
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn create_column(&self, column: &Column) -> Result<Column, StoreError> {
        let column = column.clone();
        self.conn
            .call(move |conn| {
                insert_column(conn, &column)?;
                Ok(())
            })
            .await?;
        Ok(column)
    }

    pub async fn get_column(&self, id: Uuid) -> Result<Option<Column>, StoreError> {
        let id_s = id.to_string();
        let col = self.conn.call(move |conn| fetch_column(conn, &id_s)).await?;
        Ok(col)
    }

    pub async fn list_columns(&self, board_id: Uuid) -> Result<Vec<Column>, StoreError> {
        let board_id_s = board_id.to_string();
        let cols = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT * FROM columns WHERE board_id=?1 ORDER BY position")?;
                let mut rows = stmt.query(params![board_id_s])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_column(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(cols)
    }

    pub async fn update_column_routing(
        &self,
        column_id: Uuid,
        on_success: Option<Uuid>,
        on_failure: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let column_id_s = column_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE columns SET on_success_column_id=?1, on_failure_column_id=?2 WHERE id=?3",
                    params![
                        on_success.map(|u| u.to_string()),
                        on_failure.map(|u| u.to_string()),
                        column_id_s,
                    ],
                )
            })
            .await?;
        Ok(())
    }

    pub async fn create_card(&self, card: &Card) -> Result<Card, StoreError> {
        let card = card.clone();
        self.conn
            .call(move |conn| {
                insert_card(conn, &card)?;
                Ok(())
            })
            .await?;
        Ok(card)
    }

    pub async fn get_card(&self, id: Uuid) -> Result<Option<Card>, StoreError> {
        let id_s = id.to_string();
        let card = self.conn.call(move |conn| fetch_card(conn, &id_s)).await?;
        Ok(card)
    }

    pub async fn list_cards(&self, column_id: Uuid) -> Result<Vec<Card>, StoreError> {
        let column_id_s = column_id.to_string();
        let cards = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT * FROM cards WHERE column_id=?1 ORDER BY position")?;
                let mut rows = stmt.query(params![column_id_s])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_card(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(cards)
    }

    pub async fn set_card_agent_status(
        &self,
        card_id: Uuid,
        status: AgentStatus,
    ) -> Result<(), StoreError> {
        let card_id_s = card_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE cards SET agent_status=?1 WHERE id=?2",
                    params![status.as_str(), card_id_s],
                )
            })
            .await?;
        Ok(())
    }

    /// Move a card into `dest_column_id`, optionally firing the automation
    /// trigger for the destination column.
    pub async fn move_card(
        &self,
        card_id: Uuid,
        dest_column_id: Uuid,
        position: i32,
        actor_user_id: Uuid,
        skip_automation: bool,
    ) -> Result<Option<Task>, StoreError> {
        let card_id_s = card_id.to_string();
        let dest_id_s = dest_column_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE cards SET column_id=?1, position=?2 WHERE id=?3",
                    params![dest_id_s, position, card_id_s],
                )
            })
            .await?;
        if skip_automation {
            return Ok(None);
        }
        let card = self
            .get_card(card_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(card_id.to_string()))?;
        let column = self
            .get_column(dest_column_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(dest_column_id.to_string()))?;
        automation::maybe_trigger(self, &card, &column, actor_user_id).await
    }

    // -----------------------------------------------------------------------
    // Worker registry
    // -----------------------------------------------------------------------

    pub async fn upsert_worker(
        &self,
        user_id: Uuid,
        hostname: String,
        version: String,
        capabilities: Vec<String>,
    ) -> Result<Worker, StoreError> {
        let worker = Worker {
            id: Uuid::new_v4(),
            user_id,
            hostname,
            version,
            status: WorkerStatus::Online,
            last_heartbeat: Utc::now(),
            capabilities,
        };
        let existing_id = self.get_worker_id_for_user(user_id).await?;
        let id = existing_id.unwrap_or(worker.id);
        let w2 = Worker { id, ..worker };
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO workers (id, user_id, hostname, version, status, last_heartbeat, capabilities_json)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)
                     ON CONFLICT(user_id) DO UPDATE SET
                        hostname=excluded.hostname, version=excluded.version,
                        status=excluded.status, last_heartbeat=excluded.last_heartbeat,
                        capabilities_json=excluded.capabilities_json",
                    params![
                        w2.id.to_string(),
                        w2.user_id.to_string(),
                        w2.hostname,
                        w2.version,
                        worker_status_as_str(w2.status),
                        w2.last_heartbeat.to_rfc3339(),
                        serde_json::to_string(&w2.capabilities).unwrap_or_default(),
                    ],
                )
            })
            .await?;
        self.get_worker(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_worker_id_for_user(&self, user_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let user_id_s = user_id.to_string();
        let id: Option<String> = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT id FROM workers WHERE user_id=?1",
                    params![user_id_s],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(id.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    pub async fn get_worker(&self, id: Uuid) -> Result<Option<Worker>, StoreError> {
        let id_s = id.to_string();
        let w = self.conn.call(move |conn| fetch_worker(conn, &id_s)).await?;
        Ok(w)
    }

    pub async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let workers = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT * FROM workers")?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_worker(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(workers)
    }

    pub async fn touch_worker_heartbeat(&self, worker_id: Uuid) -> Result<(), StoreError> {
        let worker_id_s = worker_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE workers SET last_heartbeat=?1, status='online' WHERE id=?2",
                    params![now, worker_id_s],
                )
            })
            .await?;
        Ok(())
    }

    /// Backdates a worker's `last_heartbeat`, for exercising the staleness
    /// sweep without sleeping the test thread for real. Not wired to any
    /// HTTP route; a test-only seam on the store itself.
    pub async fn set_worker_heartbeat_at(
        &self,
        worker_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let worker_id_s = worker_id.to_string();
        let at_s = at.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE workers SET last_heartbeat=?1 WHERE id=?2",
                    params![at_s, worker_id_s],
                )
            })
            .await?;
        Ok(())
    }

    pub async fn set_worker_status(
        &self,
        worker_id: Uuid,
        status: WorkerStatus,
    ) -> Result<(), StoreError> {
        let worker_id_s = worker_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE workers SET status=?1 WHERE id=?2",
                    params![worker_status_as_str(status), worker_id_s],
                )
            })
            .await?;
        Ok(())
    }

    /// Tasks in `ids` that the server has already marked `cancelled` — the
    /// set a heartbeat response should surface as `cancel_task_ids`.
    pub async fn tasks_cancelled_among(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, StoreError> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(task) = self.get_task(*id).await? {
                if task.status == TaskStatus::Cancelled {
                    out.push(*id);
                }
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// SQL <-> domain mapping helpers
// ---------------------------------------------------------------------------

fn task_status_from_str(s: &str) -> TaskStatus {
    match s {
        "pending" => TaskStatus::Pending,
        "claimed" => TaskStatus::Claimed,
        "running" => TaskStatus::Running,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Cancelled,
    }
}

fn worker_status_from_str(s: &str) -> WorkerStatus {
    match s {
        "online" => WorkerStatus::Online,
        "stale" => WorkerStatus::Stale,
        _ => WorkerStatus::Offline,
    }
}

fn worker_status_as_str(s: WorkerStatus) -> &'static str {
    s.as_str()
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_default()
}

pub(crate) fn insert_task(conn: &rusqlite::Connection, task: &Task) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, board_id, card_id, task_type, status, agent_type, agent_model,
            agent_skill, prompt_text, payload_json, source_column_id, target_column_id,
            failure_column_id, priority, created_by, assigned_to, worker_id, output_text,
            error_summary, result_data_json, created_at, started_at, completed_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)",
        params![
            task.id.to_string(),
            task.board_id.to_string(),
            task.card_id.map(|u| u.to_string()),
            task.task_type.as_str(),
            task.status.as_str(),
            task.agent_type,
            task.agent_model,
            task.agent_skill,
            task.prompt_text,
            serde_json::to_string(&task.payload).unwrap_or_else(|_| "{}".into()),
            task.source_column_id.map(|u| u.to_string()),
            task.target_column_id.map(|u| u.to_string()),
            task.failure_column_id.map(|u| u.to_string()),
            task.priority,
            task.created_by.map(|u| u.to_string()),
            task.assigned_to.map(|u| u.to_string()),
            task.worker_id.map(|u| u.to_string()),
            task.output_text,
            task.error_summary,
            task.result_data.as_ref().map(|v| v.to_string()),
            task.created_at.to_rfc3339(),
            task.started_at.map(|d| d.to_rfc3339()),
            task.completed_at.map(|d| d.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub(crate) fn fetch_task(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<Task>> {
    conn.query_row("SELECT * FROM tasks WHERE id=?1", params![id], |row| {
        row_to_task(row)
    })
    .optional()
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let task_type_str: String = row.get("task_type")?;
    let status_str: String = row.get("status")?;
    let payload_str: String = row.get("payload_json")?;
    let card_id: Option<String> = row.get("card_id")?;
    let source_column_id: Option<String> = row.get("source_column_id")?;
    let target_column_id: Option<String> = row.get("target_column_id")?;
    let failure_column_id: Option<String> = row.get("failure_column_id")?;
    let created_by: Option<String> = row.get("created_by")?;
    let assigned_to: Option<String> = row.get("assigned_to")?;
    let worker_id: Option<String> = row.get("worker_id")?;
    let result_data_json: Option<String> = row.get("result_data_json")?;
    let created_at: String = row.get("created_at")?;
    let started_at: Option<String> = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(Task {
        id: parse_uuid(&row.get::<_, String>("id")?),
        board_id: parse_uuid(&row.get::<_, String>("board_id")?),
        card_id: card_id.as_deref().map(parse_uuid),
        task_type: TaskType::parse(&task_type_str),
        status: task_status_from_str(&status_str),
        agent_type: row.get("agent_type")?,
        agent_model: row.get("agent_model")?,
        agent_skill: row.get("agent_skill")?,
        prompt_text: row.get("prompt_text")?,
        payload: serde_json::from_str(&payload_str).unwrap_or(TaskPayload::Unknown),
        source_column_id: source_column_id.as_deref().map(parse_uuid),
        target_column_id: target_column_id.as_deref().map(parse_uuid),
        failure_column_id: failure_column_id.as_deref().map(parse_uuid),
        priority: row.get("priority")?,
        created_by: created_by.as_deref().map(parse_uuid),
        assigned_to: assigned_to.as_deref().map(parse_uuid),
        worker_id: worker_id.as_deref().map(parse_uuid),
        output_text: row.get("output_text")?,
        error_summary: row.get("error_summary")?,
        result_data: result_data_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok()),
        created_at: parse_dt(&created_at),
        started_at: started_at.as_deref().map(parse_dt),
        completed_at: completed_at.as_deref().map(parse_dt),
    })
}

pub(crate) fn insert_column(conn: &rusqlite::Connection, col: &Column) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO columns (id, board_id, name, position, auto_run, agent_type, agent_model,
            agent_skill, prompt_template, max_loop_count, on_success_column_id, on_failure_column_id)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
        params![
            col.id.to_string(),
            col.board_id.to_string(),
            col.name,
            col.position,
            col.auto_run as i64,
            col.agent_type,
            col.agent_model,
            col.agent_skill,
            col.prompt_template,
            col.max_loop_count,
            col.on_success_column_id.map(|u| u.to_string()),
            col.on_failure_column_id.map(|u| u.to_string()),
        ],
    )?;
    Ok(())
}

pub(crate) fn fetch_column(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<Column>> {
    conn.query_row("SELECT * FROM columns WHERE id=?1", params![id], |row| {
        row_to_column(row)
    })
    .optional()
}

fn row_to_column(row: &rusqlite::Row<'_>) -> rusqlite::Result<Column> {
    let on_success: Option<String> = row.get("on_success_column_id")?;
    let on_failure: Option<String> = row.get("on_failure_column_id")?;
    Ok(Column {
        id: parse_uuid(&row.get::<_, String>("id")?),
        board_id: parse_uuid(&row.get::<_, String>("board_id")?),
        name: row.get("name")?,
        position: row.get("position")?,
        auto_run: row.get::<_, i64>("auto_run")? != 0,
        agent_type: row.get("agent_type")?,
        agent_model: row.get("agent_model")?,
        agent_skill: row.get("agent_skill")?,
        prompt_template: row.get("prompt_template")?,
        max_loop_count: row.get("max_loop_count")?,
        on_success_column_id: on_success.as_deref().map(parse_uuid),
        on_failure_column_id: on_failure.as_deref().map(parse_uuid),
    })
}

pub(crate) fn insert_card(conn: &rusqlite::Connection, card: &Card) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cards (id, board_id, column_id, position, title, description, priority,
            labels_json, assignee_id, agent_status)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
        params![
            card.id.to_string(),
            card.board_id.to_string(),
            card.column_id.to_string(),
            card.position,
            card.title,
            card.description,
            card.priority,
            serde_json::to_string(&card.labels).unwrap_or_else(|_| "[]".into()),
            card.assignee_id.map(|u| u.to_string()),
            card.agent_status.as_str(),
        ],
    )?;
    Ok(())
}

pub(crate) fn fetch_card(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Card>> {
    conn.query_row("SELECT * FROM cards WHERE id=?1", params![id], |row| {
        row_to_card(row)
    })
    .optional()
}

fn row_to_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    let labels_json: String = row.get("labels_json")?;
    let assignee_id: Option<String> = row.get("assignee_id")?;
    let agent_status_str: String = row.get("agent_status")?;
    Ok(Card {
        id: parse_uuid(&row.get::<_, String>("id")?),
        board_id: parse_uuid(&row.get::<_, String>("board_id")?),
        column_id: parse_uuid(&row.get::<_, String>("column_id")?),
        position: row.get("position")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority: row.get("priority")?,
        labels: serde_json::from_str(&labels_json).unwrap_or_default(),
        assignee_id: assignee_id.as_deref().map(parse_uuid),
        agent_status: AgentStatus::parse(&agent_status_str),
    })
}

pub(crate) fn fetch_board(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<Board>> {
    conn.query_row("SELECT * FROM boards WHERE id=?1", params![id], |row| {
        row_to_board(row)
    })
    .optional()
}

fn row_to_board(row: &rusqlite::Row<'_>) -> rusqlite::Result<Board> {
    let settings_json: String = row.get("settings_json")?;
    let settings: BoardSettings = serde_json::from_str(&settings_json).unwrap_or(BoardSettings {
        workspace: WorkspaceBoardSettings::default(),
        gitlab: GitLabBoardSettings::default(),
    });
    Ok(Board {
        id: parse_uuid(&row.get::<_, String>("id")?),
        owner_id: parse_uuid(&row.get::<_, String>("owner_id")?),
        name: row.get("name")?,
        description: row.get("description")?,
        settings,
    })
}

fn fetch_worker(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Worker>> {
    conn.query_row("SELECT * FROM workers WHERE id=?1", params![id], |row| {
        row_to_worker(row)
    })
    .optional()
}

fn row_to_worker(row: &rusqlite::Row<'_>) -> rusqlite::Result<Worker> {
    let status_str: String = row.get("status")?;
    let capabilities_json: String = row.get("capabilities_json")?;
    let last_heartbeat: String = row.get("last_heartbeat")?;
    Ok(Worker {
        id: parse_uuid(&row.get::<_, String>("id")?),
        user_id: parse_uuid(&row.get::<_, String>("user_id")?),
        hostname: row.get("hostname")?,
        version: row.get("version")?,
        status: worker_status_from_str(&status_str),
        last_heartbeat: parse_dt(&last_heartbeat),
        capabilities: serde_json::from_str(&capabilities_json).unwrap_or_default(),
    })
}
