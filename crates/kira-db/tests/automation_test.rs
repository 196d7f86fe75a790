//! Automation trigger: column-driven task synthesis and its circuit breaker.

use kira_core::types::{AgentStatus, Board, BoardSettings, Card, Column};
use kira_db::automation::{self, render_prompt};
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

fn make_column(board_id: Uuid, auto_run: bool, agent_type: Option<&str>, max_loop_count: i32) -> Column {
    Column {
        id: Uuid::new_v4(),
        board_id,
        name: "Architect".to_string(),
        position: 0,
        auto_run,
        agent_type: agent_type.map(str::to_string),
        agent_model: None,
        agent_skill: None,
        prompt_template: None,
        max_loop_count,
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
        title: "Fix the widget".to_string(),
        description: "It's broken".to_string(),
        priority: "medium".to_string(),
        labels: vec![],
        assignee_id: None,
        agent_status: AgentStatus::None,
    }
}

#[tokio::test]
async fn maybe_trigger_creates_a_task_for_an_auto_run_column() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner_id = Uuid::new_v4();
    let board = store.create_board(&make_board(owner_id)).await.unwrap();
    let column = store
        .create_column(&make_column(board.id, true, Some("architect"), 3))
        .await
        .unwrap();
    let card = store.create_card(&make_card(board.id, column.id)).await.unwrap();

    let task = automation::maybe_trigger(&store, &card, &column, owner_id)
        .await
        .unwrap()
        .expect("auto_run column with an agent_type must synthesize a task");
    assert_eq!(task.agent_type.as_deref(), Some("architect"));
    assert_eq!(task.card_id, Some(card.id));
}

#[tokio::test]
async fn maybe_trigger_is_a_noop_off_an_auto_run_column() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner_id = Uuid::new_v4();
    let board = store.create_board(&make_board(owner_id)).await.unwrap();
    let column = store
        .create_column(&make_column(board.id, false, Some("architect"), 3))
        .await
        .unwrap();
    let card = store.create_card(&make_card(board.id, column.id)).await.unwrap();

    let task = automation::maybe_trigger(&store, &card, &column, owner_id).await.unwrap();
    assert!(task.is_none());
}

#[tokio::test]
async fn maybe_trigger_is_a_noop_without_an_agent_type() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner_id = Uuid::new_v4();
    let board = store.create_board(&make_board(owner_id)).await.unwrap();
    let column = store.create_column(&make_column(board.id, true, None, 3)).await.unwrap();
    let card = store.create_card(&make_card(board.id, column.id)).await.unwrap();

    let task = automation::maybe_trigger(&store, &card, &column, owner_id).await.unwrap();
    assert!(task.is_none());
}

/// *S3 — circuit breaker.* A column with `max_loop_count = 2` that already
/// has two tasks recorded against the card never synthesizes a third.
#[tokio::test]
async fn circuit_breaker_stops_after_max_loop_count() {
    let store = TaskStore::new_in_memory().await.unwrap();
    let owner_id = Uuid::new_v4();
    let board = store.create_board(&make_board(owner_id)).await.unwrap();
    let column = store
        .create_column(&make_column(board.id, true, Some("coder"), 2))
        .await
        .unwrap();
    let card = store.create_card(&make_card(board.id, column.id)).await.unwrap();

    // Pre-seed two prior tasks run out of this column for this card.
    for _ in 0..2 {
        let mut task = kira_core::types::Task::new(
            board.id,
            kira_core::types::TaskType::AgentRun,
            kira_core::types::TaskPayload::AgentRun,
        );
        task.card_id = Some(card.id);
        task.source_column_id = Some(column.id);
        store.create_task(&task).await.unwrap();
    }

    assert_eq!(store.count_prior_tasks(card.id, column.id).await.unwrap(), 2);

    let task = automation::maybe_trigger(&store, &card, &column, owner_id).await.unwrap();
    assert!(task.is_none(), "circuit breaker must suppress a third task");
}

#[test]
fn render_prompt_substitutes_known_fields() {
    let board_id = Uuid::new_v4();
    let column = make_column(board_id, true, Some("architect"), 3);
    let card = Card {
        agent_status: AgentStatus::None,
        ..make_card(board_id, column.id)
    };

    let out = render_prompt("Work on card \"{title}\" in column {column}: {description}", &card, &column);
    assert_eq!(out, "Work on card \"Fix the widget\" in column Architect: It's broken");
}

#[test]
fn render_prompt_leaves_unknown_fields_literal() {
    let board_id = Uuid::new_v4();
    let column = make_column(board_id, true, Some("architect"), 3);
    let card = make_card(board_id, column.id);

    let out = render_prompt("{title} / {nonexistent}", &card, &column);
    assert_eq!(out, "Fix the widget / {nonexistent}");
}
