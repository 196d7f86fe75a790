//! Column-driven task synthesis and the completion cascade.
//!
//! `maybe_trigger` is the automation entry point invoked whenever a card
//! lands in a column (move, create, or cascade routing). `cascade::run` is
//! the completion-side counterpart, invoked from inside the same
//! transaction that commits a task's terminal status — see
//! `TaskStore::terminal_transition`.

use kira_core::types::{Card, Column, Task, TaskPayload, TaskType};
use uuid::Uuid;

use crate::store::StoreError;
use crate::TaskStore;

/// Case-insensitive prefix on a reviewer's `output_text` that the cascade
/// treats as a rejection rather than an approval — a named policy constant,
/// not a magic string scattered through the cascade.
pub const REVIEWER_REJECTION_PREFIX: &str = "REJECTED";

pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Work on card \"{title}\" in column {column}: {description}";

/// `maybe_trigger(card, dest_column, actor) -> Task | null`.
///
/// Returns `None` unless the destination column is `auto_run` with a
/// non-empty `agent_type` and the card/column pair hasn't exhausted its
/// `max_loop_count` circuit breaker.
pub async fn maybe_trigger(
    store: &TaskStore,
    card: &Card,
    dest_column: &Column,
    actor_user_id: Uuid,
) -> Result<Option<Task>, StoreError> {
    if !dest_column.auto_run || dest_column.agent_type.as_deref().unwrap_or("").is_empty() {
        return Ok(None);
    }
    let prior = store.count_prior_tasks(card.id, dest_column.id).await?;
    if prior >= dest_column.max_loop_count as i64 {
        return Ok(None);
    }

    let prompt = render_prompt(
        dest_column
            .prompt_template
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_PROMPT_TEMPLATE),
        card,
        dest_column,
    );

    let mut task = Task::new(card.board_id, TaskType::AgentRun, TaskPayload::AgentRun);
    task.card_id = Some(card.id);
    task.agent_type = dest_column.agent_type.clone();
    task.agent_model = dest_column.agent_model.clone();
    task.agent_skill = dest_column.agent_skill.clone();
    task.source_column_id = Some(dest_column.id);
    task.target_column_id = dest_column.on_success_column_id;
    task.failure_column_id = dest_column.on_failure_column_id;
    task.prompt_text = Some(prompt);
    task.assigned_to = card.assignee_id.or(Some(actor_user_id));
    task.created_by = Some(actor_user_id);

    let created = store.create_task(&task).await?;
    Ok(Some(created))
}

/// `{field}` substitution: known fields are replaced, unknown ones are left
/// literal (including their braces).
pub fn render_prompt(template: &str, card: &Card, column: &Column) -> String {
    let field = |name: &str| -> Option<String> {
        match name {
            "title" => Some(card.title.clone()),
            "description" => Some(card.description.clone()),
            "priority" => Some(card.priority.clone()),
            "column" => Some(column.name.clone()),
            "board_id" => Some(card.board_id.to_string()),
            _ => None,
        }
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match field(key) {
                    Some(val) => out.push_str(&val),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub mod cascade {
    use chrono::{DateTime, Utc};
    use kira_core::types::{AgentStatus, GitLabBoardSettings, Task, TaskPayload, TaskStatus, TaskType};
    use rusqlite::{params, Transaction};
    use uuid::Uuid;

    use super::REVIEWER_REJECTION_PREFIX;
    use crate::store::{fetch_board, fetch_card, fetch_column, fetch_task, insert_task, CascadeOutcome};

    /// Runs the completion cascade for the task just transitioned to a
    /// terminal status, inside the caller's transaction.
    ///
    /// 1. Updates the card's `agent_status` mirror to match the task's
    ///    terminal status.
    /// 2. Routes the card into `target_column_id` (success) or
    ///    `failure_column_id` (failure, or a reviewer rejection).
    /// 3. Re-fires the automation trigger on the destination column unless
    ///    the routing step requested `skip_automation`.
    /// 4. Evaluates the GitLab auto-push/push-on-complete chaining rules,
    ///    deduplicated so at most one `gitlab_push` task is ever emitted for
    ///    a single completion.
    pub(crate) fn run(
        tx: &Transaction<'_>,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> rusqlite::Result<CascadeOutcome> {
        let task = fetch_task(tx, task_id)?.expect("task row just updated");
        let mut outcome = CascadeOutcome::default();

        let Some(card_id) = task.card_id else {
            return Ok(outcome);
        };
        let card_id_s = card_id.to_string();

        // 1. Card mirror.
        let agent_status = AgentStatus::from(task.status);
        tx.execute(
            "UPDATE cards SET agent_status=?1 WHERE id=?2",
            params![agent_status.as_str(), card_id_s],
        )?;

        let is_rejection = task
            .output_text
            .as_deref()
            .map(|s| s.trim_start().to_uppercase().starts_with(REVIEWER_REJECTION_PREFIX))
            .unwrap_or(false);
        let succeeded = task.status == TaskStatus::Completed && !is_rejection;

        // 2. Routing.
        let dest_column_id = if succeeded {
            task.target_column_id
        } else {
            task.failure_column_id
        };
        let skip_automation = !succeeded;

        if let Some(dest_id) = dest_column_id {
            let dest_id_s = dest_id.to_string();
            tx.execute(
                "UPDATE cards SET column_id=?1 WHERE id=?2",
                params![dest_id_s, card_id_s],
            )?;
            outcome.card_moved_to = Some(dest_id);

            if !skip_automation {
                if let (Some(card), Some(column)) =
                    (fetch_card(tx, &card_id_s)?, fetch_column(tx, &dest_id_s)?)
                {
                    if let Some(new_task) =
                        trigger_sync(tx, &card, &column, task.assigned_to.or(task.created_by))?
                    {
                        outcome.new_tasks.push(new_task);
                    }
                }
            }
        }

        // 4. Integration chaining (GitLab).
        if succeeded {
            if let Some(board) = fetch_board(tx, &task.board_id.to_string())? {
                if let Some(gp_task) =
                    maybe_gitlab_push(tx, &task, card_id, dest_column_id, &board.settings.gitlab)?
                {
                    outcome.new_tasks.push(gp_task);
                }
            }
        }

        Ok(outcome)
    }

    /// Synchronous counterpart of `maybe_trigger`, usable from inside an
    /// already-open transaction (the async version would deadlock the
    /// single-writer connection).
    fn trigger_sync(
        tx: &Transaction<'_>,
        card: &kira_core::types::Card,
        column: &kira_core::types::Column,
        actor_user_id: Option<Uuid>,
    ) -> rusqlite::Result<Option<Task>> {
        if !column.auto_run || column.agent_type.as_deref().unwrap_or("").is_empty() {
            return Ok(None);
        }
        let prior: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE card_id=?1 AND source_column_id=?2",
            params![card.id.to_string(), column.id.to_string()],
            |row| row.get(0),
        )?;
        if prior >= column.max_loop_count as i64 {
            return Ok(None);
        }

        let prompt = super::render_prompt(
            column
                .prompt_template
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(super::DEFAULT_PROMPT_TEMPLATE),
            card,
            column,
        );

        let mut task = Task::new(card.board_id, TaskType::AgentRun, TaskPayload::AgentRun);
        task.card_id = Some(card.id);
        task.agent_type = column.agent_type.clone();
        task.agent_model = column.agent_model.clone();
        task.agent_skill = column.agent_skill.clone();
        task.source_column_id = Some(column.id);
        task.target_column_id = column.on_success_column_id;
        task.failure_column_id = column.on_failure_column_id;
        task.prompt_text = Some(prompt);
        task.assigned_to = card.assignee_id.or(actor_user_id);
        task.created_by = actor_user_id;

        insert_task(tx, &task)?;
        tx.execute(
            "UPDATE cards SET agent_status=?1 WHERE id=?2",
            params![AgentStatus::Pending.as_str(), card.id.to_string()],
        )?;
        Ok(Some(task))
    }

    /// Evaluates both GitLab chaining conditions in one pass so exactly one
    /// `gitlab_push` is ever emitted for a completion, regardless of how
    /// many individual conditions fire, matching
    /// `original_source/tests/test_web_gitlab.py`.
    fn maybe_gitlab_push(
        tx: &Transaction<'_>,
        task: &Task,
        card_id: Uuid,
        dest_column_id: Option<Uuid>,
        gitlab: &GitLabBoardSettings,
    ) -> rusqlite::Result<Option<Task>> {
        let Some(project_id) = gitlab.project_id else {
            return Ok(None);
        };

        let auto_push_fires = gitlab.auto_push && task.agent_type.as_deref() == Some("coder");

        let push_on_complete_fires = gitlab.push_on_complete
            && dest_column_id
                .and_then(|id| fetch_column(tx, &id.to_string()).ok().flatten())
                .map(|col| col.is_terminal())
                .unwrap_or(false);

        if !auto_push_fires && !push_on_complete_fires {
            return Ok(None);
        }

        let card_title = fetch_card(tx, &card_id.to_string())?.map(|c| c.title);

        let payload = TaskPayload::GitlabPush {
            project_id,
            project_path: gitlab.project_path.clone(),
            default_branch: gitlab.default_branch.clone(),
            mr_prefix: gitlab.mr_prefix.clone(),
            card_title,
            branch_name: None,
            create_mr: true,
            commit_message: None,
        };
        let mut push_task = Task::new(task.board_id, TaskType::GitlabPush, payload);
        push_task.card_id = Some(card_id);
        push_task.assigned_to = task.assigned_to;
        push_task.created_by = task.created_by;

        insert_task(tx, &push_task)?;
        Ok(Some(push_task))
    }
}
