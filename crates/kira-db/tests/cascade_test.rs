//! The completion cascade: card mirroring, routing, and the full pipeline.

use kira_core::types::{AgentStatus, Board, BoardSettings, Card, Column};
use kira_db::TaskStore;
use uuid::Uuid;

fn make_board(owner_id: Uuid) -> Board {
    Board {
        id: Uuid::new_v4(),
        owner_id,
        name: "Kira".to_string(),
        description: String::new(),
        settings: BoardSettings::default(),
    }
}

fn make_column(board_id: Uuid, name: &str, auto_run: bool, agent_type: Option<&str>) -> Column {
    Column {
        id: Uuid::new_v4(),
        board_id,
        name: name.to_string(),
        position: 0,
        auto_run,
        agent_type: agent_type.map(str::to_string),
        agent_model: None,
        agent_skill: None,
        prompt_template: None,
        max_loop_count: Column::default_max_loop_count(),
        on_success_column_id: None,
        on_failure_column_id: None,
    }
}

fn make_card(board_id: Uuid, column_id: Uuid) -> Card {
    Card {
        id: Uuid::new_v4(),
        board_id,
        column_id,
        position: 0,
        title: "Ship the feature".to_string(),
        description: String::new(),
        priority: "medium".to_string(),
        labels: vec![],
        assignee_id: None,
        agent_status: AgentStatus::None,
    }
}

/// *P3* Immediately after a terminal transition commits, the card's
/// `agent_status` mirrors the task's terminal status.
#[tokio::test]
async fn completing_a_task_mirrors_agent_status_onto_its_card() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner_id = Uuid::new_v4();
    let board = store.create_board(&make_board(owner_id)).await.unwrap();
    let backlog = store.create_column(&make_column(board.id, "Backlog", false, None)).await.unwrap();
    let card = store.create_card(&make_card(board.id, backlog.id)).await.unwrap();

    let mut task = kira_core::types::Task::new(
        board.id,
        kira_core::types::TaskType::AgentRun,
        kira_core::types::TaskPayload::AgentRun,
    );
    task.card_id = Some(card.id);
    let task = store.create_task(&task).await.unwrap();

    let worker_id = Uuid::new_v4();
    store.claim_task(task.id, worker_id).await.unwrap();
    store.update_progress(task.id, None, None, None, None).await.unwrap();
    store.complete_task(task.id, Some("done".to_string()), None).await.unwrap();

    let card = store.get_card(card.id).await.unwrap().unwrap();
    assert_eq!(card.agent_status, AgentStatus::Completed);
}

#[tokio::test]
async fn failing_a_task_mirrors_failed_onto_its_card() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner_id = Uuid::new_v4();
    let board = store.create_board(&make_board(owner_id)).await.unwrap();
    let backlog = store.create_column(&make_column(board.id, "Backlog", false, None)).await.unwrap();
    let card = store.create_card(&make_card(board.id, backlog.id)).await.unwrap();

    let mut task = kira_core::types::Task::new(
        board.id,
        kira_core::types::TaskType::AgentRun,
        kira_core::types::TaskPayload::AgentRun,
    );
    task.card_id = Some(card.id);
    let task = store.create_task(&task).await.unwrap();

    store.claim_task(task.id, Uuid::new_v4()).await.unwrap();
    store.fail_task(task.id, "boom".to_string(), None).await.unwrap();

    let card = store.get_card(card.id).await.unwrap().unwrap();
    assert_eq!(card.agent_status, AgentStatus::Failed);
}

/// *S1 — full happy-path pipeline.* Backlog -> Architect -> Code -> Review
/// -> Done, three agent-run tasks total, each completing the prior one and
/// synthesizing the next via the automation trigger wired through
/// `target_column_id`.
#[tokio::test]
async fn full_pipeline_moves_the_card_through_three_agent_stages_to_done() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner_id = Uuid::new_v4();
    let board = store.create_board(&make_board(owner_id)).await.unwrap();

    let done = store.create_column(&make_column(board.id, "Done", false, None)).await.unwrap();
    let mut review = make_column(board.id, "Review", true, Some("reviewer"));
    review.on_success_column_id = Some(done.id);
    review.on_failure_column_id = None;
    let review = store.create_column(&review).await.unwrap();

    let mut code = make_column(board.id, "Code", true, Some("coder"));
    code.on_success_column_id = Some(review.id);
    let code = store.create_column(&code).await.unwrap();

    let mut architect = make_column(board.id, "Architect", true, Some("architect"));
    architect.on_success_column_id = Some(code.id);
    let architect = store.create_column(&architect).await.unwrap();

    let backlog = store.create_column(&make_column(board.id, "Backlog", false, None)).await.unwrap();
    let card = store.create_card(&make_card(board.id, backlog.id)).await.unwrap();

    let worker = store
        .upsert_worker(Uuid::new_v4(), "host-1".to_string(), "0.1.0".to_string(), vec![])
        .await
        .unwrap();

    // Backlog -> Architect: card moves, automation synthesizes an
    // `architect` task.
    let first_task = store
        .move_card(card.id, architect.id, 0, owner_id, false)
        .await
        .unwrap()
        .expect("moving onto an auto_run column must synthesize a task");
    assert_eq!(first_task.agent_type.as_deref(), Some("architect"));

    let claimed = store.claim_task(first_task.id, worker.id).await.unwrap();
    store.update_progress(claimed.id, None, None, None, None).await.unwrap();
    let outcome = store
        .complete_task(claimed.id, Some("Architecture: split into two services".to_string()), None)
        .await
        .unwrap();
    assert_eq!(outcome.card_moved_to, Some(code.id));
    let coder_task = outcome.new_tasks.first().expect("coder task synthesized");
    assert_eq!(coder_task.agent_type.as_deref(), Some("coder"));

    let claimed = store.claim_task(coder_task.id, worker.id).await.unwrap();
    store.update_progress(claimed.id, None, None, None, None).await.unwrap();
    let outcome = store
        .complete_task(claimed.id, Some("Implemented the split".to_string()), None)
        .await
        .unwrap();
    assert_eq!(outcome.card_moved_to, Some(review.id));
    let reviewer_task = outcome.new_tasks.first().expect("reviewer task synthesized");
    assert_eq!(reviewer_task.agent_type.as_deref(), Some("reviewer"));

    let claimed = store.claim_task(reviewer_task.id, worker.id).await.unwrap();
    store.update_progress(claimed.id, None, None, None, None).await.unwrap();
    let outcome = store
        .complete_task(claimed.id, Some("APPROVED".to_string()), None)
        .await
        .unwrap();
    assert_eq!(outcome.card_moved_to, Some(done.id));
    assert!(outcome.new_tasks.is_empty(), "Done is not auto_run, no further task");

    let final_card = store.get_card(card.id).await.unwrap().unwrap();
    assert_eq!(final_card.column_id, done.id);
    assert_eq!(final_card.agent_status, AgentStatus::Completed);

    let total_tasks_for_card = store.count_prior_tasks(card.id, architect.id).await.unwrap()
        + store.count_prior_tasks(card.id, code.id).await.unwrap()
        + store.count_prior_tasks(card.id, review.id).await.unwrap();
    assert_eq!(total_tasks_for_card, 3);
}

/// *S2 — reviewer rejection loop.* A `REJECTED` output routes the card back
/// to `failure_column_id` with automation suppressed; no new coder task is
/// created and no pending task remains for the card.
#[tokio::test]
async fn reviewer_rejection_routes_back_without_spawning_a_new_task() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner_id = Uuid::new_v4();
    let board = store.create_board(&make_board(owner_id)).await.unwrap();

    let mut review = make_column(board.id, "Review", true, Some("reviewer"));
    let code = store.create_column(&make_column(board.id, "Code", true, Some("coder"))).await.unwrap();
    review.on_failure_column_id = Some(code.id);
    let review = store.create_column(&review).await.unwrap();

    let card = store.create_card(&make_card(board.id, review.id)).await.unwrap();
    let worker = store
        .upsert_worker(Uuid::new_v4(), "host-1".to_string(), "0.1.0".to_string(), vec![])
        .await
        .unwrap();

    let mut task = kira_core::types::Task::new(
        board.id,
        kira_core::types::TaskType::AgentRun,
        kira_core::types::TaskPayload::AgentRun,
    );
    task.card_id = Some(card.id);
    task.source_column_id = Some(review.id);
    task.failure_column_id = review.on_failure_column_id;
    task.assigned_to = Some(worker.id);
    let task = store.create_task(&task).await.unwrap();

    let claimed = store.claim_task(task.id, worker.id).await.unwrap();
    store.update_progress(claimed.id, None, None, None, None).await.unwrap();
    let outcome = store
        .complete_task(claimed.id, Some("REJECTED. Missing error handling.".to_string()), None)
        .await
        .unwrap();

    assert_eq!(outcome.card_moved_to, Some(code.id));
    assert!(outcome.new_tasks.is_empty(), "a rejection must not synthesize a new coder task");

    // Only the original reviewer task was ever recorded against the card;
    // the rejection did not spawn a follow-on task out of either column.
    assert_eq!(store.count_prior_tasks(card.id, review.id).await.unwrap(), 1);
    assert_eq!(store.count_prior_tasks(card.id, code.id).await.unwrap(), 0);
}
