//! Decomposes a prompt into a kanban board structure (`board_plan`) or a
//! card batch on an existing board (`card_gen`), direct translation of
//! `original_source/src/kira/worker/executors/planner.py`.

use crate::client::ServerClient;
use crate::executor::{AgentClient, AgentRunOptions};
use futures_util::StreamExt;
use kira_core::types::Task;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// One entry of the fixed pipeline. The AI only ever controls card content;
/// column structure is always this 5-entry constant.
pub struct PipelineColumn {
    pub name: &'static str,
    pub color: &'static str,
    pub agent_type: &'static str,
    pub auto_run: bool,
}

pub const PIPELINE_COLUMNS: [PipelineColumn; 5] = [
    PipelineColumn { name: "Plan", color: "#6B7280", agent_type: "", auto_run: false },
    PipelineColumn { name: "Architect", color: "#8B5CF6", agent_type: "architect", auto_run: true },
    PipelineColumn { name: "Code", color: "#3B82F6", agent_type: "coder", auto_run: true },
    PipelineColumn { name: "Review", color: "#F59E0B", agent_type: "reviewer", auto_run: true },
    PipelineColumn { name: "Done", color: "#10B981", agent_type: "", auto_run: false },
];

#[derive(Debug, Clone, Deserialize)]
pub struct PlanCard {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_title() -> String {
    "Untitled".to_string()
}
fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub board_name: String,
    #[serde(default)]
    pub board_description: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub cards: Vec<PlanCard>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not parse board plan from AI output: no valid JSON with a 'cards' key found")]
    NoCardsFound,
}

/// Isolates the only content-interpreting logic in the worker runtime from
/// the byte-stream-only Agent Executor: a two-stage parse over raw model
/// output (fenced ```json block first, then a balanced-brace scan), both
/// requiring a top-level `cards` key.
pub struct PlanParser;

impl PlanParser {
    pub fn parse(output: &str) -> Result<Plan, ParseError> {
        if let Some(plan) = Self::parse_fenced_block(output) {
            return Ok(plan);
        }
        if let Some(plan) = Self::parse_balanced_braces(output) {
            return Ok(plan);
        }
        Err(ParseError::NoCardsFound)
    }

    fn parse_fenced_block(output: &str) -> Option<Plan> {
        let re = Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").expect("valid regex");
        let candidate = re.captures(output)?.get(1)?.as_str();
        let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
        if !value.get("cards").is_some() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    fn parse_balanced_braces(output: &str) -> Option<Plan> {
        let mut depth = 0i32;
        let mut start = None;
        for (i, ch) in output.char_indices() {
            match ch {
                '{' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            let candidate = &output[s..=i];
                            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                                if value.get("cards").is_some() {
                                    if let Ok(plan) = serde_json::from_value(value) {
                                        return Some(plan);
                                    }
                                }
                            }
                            start = None;
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }
}

pub struct PlannerExecutor {
    server: Arc<ServerClient>,
    worker_id: Uuid,
    agent_client: Arc<dyn AgentClient>,
    kiro_timeout_secs: u64,
}

impl PlannerExecutor {
    pub fn new(
        server: Arc<ServerClient>,
        worker_id: Uuid,
        agent_client: Arc<dyn AgentClient>,
        kiro_timeout_secs: u64,
    ) -> Self {
        Self { server, worker_id, agent_client, kiro_timeout_secs }
    }

    pub async fn execute(&self, task: &Task, working_dir: Option<PathBuf>) {
        use kira_core::types::TaskType;
        match task.task_type {
            TaskType::CardGen => self.execute_card_gen(task, working_dir).await,
            _ => self.execute_board_plan(task, working_dir).await,
        }
    }

    async fn execute_board_plan(&self, task: &Task, working_dir: Option<PathBuf>) {
        let prompt = match &task.prompt_text {
            Some(p) if !p.is_empty() => p.clone(),
            _ => {
                self.fail(task.id, "Task has no prompt_text").await;
                return;
            }
        };

        self.report(task.id, "Analyzing your request...", 1, 5, "analyzing").await;

        let plan_prompt = Self::build_plan_prompt(&prompt);
        self.report(task.id, "AI is creating a project plan...", 2, 5, "thinking").await;

        let output = match self.run_agent(task, &plan_prompt, working_dir).await {
            Ok(output) => output,
            Err(e) => {
                self.fail(task.id, &e).await;
                return;
            }
        };

        let plan = match PlanParser::parse(&output) {
            Ok(plan) => plan,
            Err(e) => {
                self.fail(task.id, &e.to_string()).await;
                return;
            }
        };
        let num_cards = plan.cards.len();

        self.report(task.id, "Setting up board columns...", 3, 5, "structuring").await;

        self.create_board_structure(task, &plan).await;

        let _ = self
            .server
            .complete_task(
                task.id,
                self.worker_id,
                Some(format!("Board plan created: {num_cards} task cards in Plan column")),
                None,
            )
            .await;
    }

    async fn execute_card_gen(&self, task: &Task, working_dir: Option<PathBuf>) {
        use kira_core::types::TaskPayload;

        let prompt = match &task.prompt_text {
            Some(p) if !p.is_empty() => p.clone(),
            _ => {
                self.fail(task.id, "Task has no prompt_text").await;
                return;
            }
        };

        self.report(task.id, "Analyzing your request...", 1, 3, "analyzing").await;

        let target_column_id = match &task.payload {
            TaskPayload::CardGen { target_column_id, .. } => Some(*target_column_id),
            _ => None,
        };

        self.report(task.id, "AI is generating task cards...", 2, 3, "thinking").await;
        let card_prompt = Self::build_card_gen_prompt(&prompt);

        let output = match self.run_agent(task, &card_prompt, working_dir).await {
            Ok(output) => output,
            Err(e) => {
                self.fail(task.id, &e).await;
                return;
            }
        };

        let plan = match PlanParser::parse(&output) {
            Ok(plan) => plan,
            Err(e) => {
                self.fail(task.id, &e.to_string()).await;
                return;
            }
        };
        let num_cards = plan.cards.len();

        self.report(task.id, &format!("Creating {num_cards} cards..."), 3, 3, "creating").await;

        if let Some(column_id) = target_column_id {
            for card in &plan.cards {
                if let Err(e) = self
                    .server
                    .create_card(column_id, &card.title, &card.description, &card.priority, card.labels.clone())
                    .await
                {
                    warn!(title = %card.title, error = %e, "failed to create card");
                }
            }
        }

        let _ = self
            .server
            .complete_task(task.id, self.worker_id, Some(format!("Generated {num_cards} cards")), None)
            .await;
    }

    /// Creates the fixed pipeline columns, places the plan summary and task
    /// cards into the Plan column, and wires `on_success`/`on_failure`
    /// routing between auto-run columns — mirroring
    /// `PlannerExecutor._create_board_structure` exactly.
    async fn create_board_structure(&self, task: &Task, plan: &Plan) {
        if !plan.board_name.is_empty() || !plan.board_description.is_empty() {
            let name = (!plan.board_name.is_empty()).then(|| plan.board_name.clone());
            let desc = (!plan.board_description.is_empty()).then(|| plan.board_description.clone());
            if let Err(e) = self.server.update_board(task.board_id, name, desc).await {
                warn!(error = %e, "failed to update board name/description");
            }
        }

        let mut created_columns: Vec<(&PipelineColumn, Uuid)> = Vec::new();
        for spec in &PIPELINE_COLUMNS {
            let agent_type = (!spec.agent_type.is_empty()).then_some(spec.agent_type);
            match self
                .server
                .create_column(task.board_id, spec.name, Some(spec.color), agent_type, spec.auto_run)
                .await
            {
                Ok(column) => created_columns.push((spec, column.id)),
                Err(e) => warn!(column = spec.name, error = %e, "failed to create column"),
            }
        }

        let plan_col_id = created_columns.first().map(|(_, id)| *id);

        self.report(task.id, &format!("Creating {} task cards...", plan.cards.len()), 4, 5, "creating").await;

        if let Some(plan_col_id) = plan_col_id {
            if !plan.plan.is_empty() {
                if let Err(e) = self
                    .server
                    .create_card(plan_col_id, "Project Plan", &plan.plan, "critical", vec!["plan".to_string()])
                    .await
                {
                    warn!(error = %e, "failed to create plan summary card");
                }
            }

            for card in &plan.cards {
                if let Err(e) = self
                    .server
                    .create_card(plan_col_id, &card.title, &card.description, &card.priority, card.labels.clone())
                    .await
                {
                    warn!(title = %card.title, error = %e, "failed to create card");
                }
            }
        }

        self.report(task.id, "Wiring automation between columns...", 5, 5, "wiring").await;

        for (i, (spec, column_id)) in created_columns.iter().enumerate() {
            if spec.auto_run && !spec.agent_type.is_empty() {
                let success_column_id = created_columns.get(i + 1).map(|(_, id)| *id);
                if success_column_id.is_some() || plan_col_id.is_some() {
                    if let Err(e) = self
                        .server
                        .update_column(*column_id, success_column_id, plan_col_id)
                        .await
                    {
                        warn!(column = %column_id, error = %e, "failed to set column routing");
                    }
                }
            }
        }
    }

    fn build_plan_prompt(prompt: &str) -> String {
        format!(
            r#"You are a project planning agent. Analyze the following request and create a detailed project plan.

## Request
{prompt}

## Instructions
Create a project plan with a high-level summary and individual task cards.
Output ONLY valid JSON with this exact structure:

```json
{{
  "board_name": "Short descriptive board name",
  "board_description": "One-line description of the project",
  "plan": "A detailed high-level plan describing the overall approach, architecture decisions, key components, dependencies, and implementation strategy.",
  "cards": [
    {{
      "title": "Short task title",
      "description": "Detailed description including acceptance criteria",
      "priority": "high",
      "labels": ["backend", "auth"]
    }}
  ]
}}
```

## Rules
- The "plan" field should be a thorough high-level plan (2-5 paragraphs)
- Each card should be a single, well-defined unit of work
- Card descriptions must be detailed enough for an AI coding agent to implement without ambiguity
- Include acceptance criteria in every card description
- Use appropriate labels: "backend", "frontend", "database", "api", "auth", "testing", "infra", "docs"
- Set priority: "critical" for blockers, "high" for core features, "medium" for supporting work, "low" for polish
- Create 5-15 cards depending on project complexity
- Order cards by dependency -- foundational work first, then features that build on it
- Cards will be placed in a Plan column and flow through: Plan -> Architect -> Code -> Review -> Done"#
        )
    }

    fn build_card_gen_prompt(prompt: &str) -> String {
        format!(
            r#"You are a task planning agent. Analyze the following request and create task cards.

## Request
{prompt}

## Instructions
Create task cards for an existing project board.
Output ONLY valid JSON with this exact structure:

```json
{{
  "cards": [
    {{
      "title": "Short task title",
      "description": "Detailed description with acceptance criteria",
      "priority": "high",
      "labels": ["backend", "api"]
    }}
  ]
}}
```

## Rules
- Each card should be a single, well-defined unit of work
- Card descriptions must be detailed enough for an AI agent to implement
- Use labels from: backend, frontend, database, api, auth, testing, infra, docs
- Priority: critical (blockers), high (core), medium (supporting), low (polish)
- Create 3-10 cards depending on complexity
- Order cards by dependency -- foundational work first"#
        )
    }

    async fn run_agent(&self, task: &Task, prompt: &str, working_dir: Option<PathBuf>) -> Result<String, String> {
        let options = AgentRunOptions {
            agent_skill: None,
            model: task.agent_model.clone().unwrap_or_else(|| "smart".to_string()),
            trust_all_tools: false,
            timeout_secs: self.kiro_timeout_secs,
            working_dir,
        };

        let stream = self.agent_client.run(prompt, &options).await.map_err(|e| e.to_string())?;
        tokio::pin!(stream);
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.map_err(|e| e.to_string())?);
        }
        Ok(chunks.join(""))
    }

    async fn fail(&self, task_id: Uuid, error_summary: &str) {
        let _ = self
            .server
            .fail_task(task_id, self.worker_id, error_summary.to_string(), None)
            .await;
    }

    async fn report(&self, task_id: Uuid, text: &str, step: i64, total_steps: i64, phase: &str) {
        if let Err(e) = self
            .server
            .report_progress(
                task_id,
                self.worker_id,
                Some(text.to_string()),
                Some(step),
                Some(total_steps),
                Some(phase.to_string()),
            )
            .await
        {
            tracing::debug!(task_id = %task_id, error = %e, "progress report failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FENCED_OUTPUT: &str = r#"Here is the plan:
```json
{
  "board_name": "Widget Shop",
  "board_description": "An online widget store",
  "plan": "Build a storefront.",
  "cards": [
    {"title": "Set up database", "description": "Create schema", "priority": "high", "labels": ["database"]}
  ]
}
```
Let me know if you need changes."#;

    #[test]
    fn parses_fenced_json_block() {
        let plan = PlanParser::parse(FENCED_OUTPUT).unwrap();
        assert_eq!(plan.board_name, "Widget Shop");
        assert_eq!(plan.cards.len(), 1);
        assert_eq!(plan.cards[0].title, "Set up database");
    }

    #[test]
    fn falls_back_to_balanced_brace_scan() {
        let output = r#"Sure, {"cards": [{"title": "Write tests"}]} is the plan."#;
        let plan = PlanParser::parse(output).unwrap();
        assert_eq!(plan.cards.len(), 1);
        assert_eq!(plan.cards[0].title, "Write tests");
    }

    #[test]
    fn rejects_json_without_cards_key() {
        let output = r#"```json
{"board_name": "No cards here"}
```"#;
        assert!(PlanParser::parse(output).is_err());
    }

    #[test]
    fn rejects_output_with_no_json_at_all() {
        assert!(PlanParser::parse("just some prose, no json").is_err());
    }

    #[test]
    fn card_defaults_apply_when_fields_missing() {
        let output = r#"{"cards": [{}]}"#;
        let plan = PlanParser::parse(output).unwrap();
        assert_eq!(plan.cards[0].title, "Untitled");
        assert_eq!(plan.cards[0].priority, "medium");
    }

    #[test]
    fn pipeline_columns_has_five_entries_in_order() {
        assert_eq!(PIPELINE_COLUMNS.len(), 5);
        assert_eq!(PIPELINE_COLUMNS[0].name, "Plan");
        assert_eq!(PIPELINE_COLUMNS[4].name, "Done");
        assert!(!PIPELINE_COLUMNS[0].auto_run);
        assert!(PIPELINE_COLUMNS[1].auto_run);
    }
}
