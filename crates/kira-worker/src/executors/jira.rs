//! Executes `jira_import`, `jira_push`, and `jira_sync` tasks, grounded on
//! `original_source/src/kira/worker/executors/jira.py` and mirroring
//! [`crate::executors::gitlab::GitLabExecutor`]'s shape.

use kira_core::types::{Task, TaskPayload};
use kira_integrations::jira::{map_priority, JiraClient, JiraConfig};
use tracing::{error, info};
use uuid::Uuid;

use crate::client::ServerClient;

pub struct JiraExecutor<'a> {
    server: &'a ServerClient,
    worker_id: Uuid,
}

impl<'a> JiraExecutor<'a> {
    pub fn new(server: &'a ServerClient, worker_id: Uuid) -> Self {
        Self { server, worker_id }
    }

    pub async fn execute(&self, task: &Task) {
        match &task.payload {
            TaskPayload::JiraImport { jql, column_id } => {
                self.import(task.id, jql, *column_id).await
            }
            TaskPayload::JiraPush { card_title, description } => {
                self.push(task.id, card_title, description).await
            }
            TaskPayload::JiraSync => self.sync(task.id).await,
            _ => self.fail(task.id, "jira executor received a non-jira payload").await,
        }
    }

    fn client(&self) -> Option<JiraClient> {
        let config = JiraConfig::load()?;
        JiraClient::new(&config).ok()
    }

    async fn import(&self, task_id: Uuid, jql: &str, column_id: Uuid) {
        let Some(client) = self.client() else {
            self.fail(task_id, "jira not configured").await;
            return;
        };

        self.progress(task_id, "Searching Jira...").await;
        let issues = match client.search(jql, 50).await {
            Ok(issues) => issues,
            Err(e) => {
                self.fail(task_id, &e.to_string()).await;
                return;
            }
        };

        let mut imported = 0usize;
        let mut skipped = 0usize;
        for issue in &issues {
            let priority = map_priority(&issue.priority);
            match self
                .server
                .create_card(
                    column_id,
                    &format!("[{}] {}", issue.key, issue.summary),
                    issue.description.as_deref().unwrap_or(""),
                    priority,
                    issue.labels.clone(),
                )
                .await
            {
                Ok(_) => imported += 1,
                Err(e) => {
                    error!(task_id = %task_id, issue = %issue.key, error = %e, "card creation failed");
                    skipped += 1;
                }
            }
        }

        info!(task_id = %task_id, imported, skipped, "jira import completed");
        let summary = format!("Imported {imported} issues, skipped {skipped}");
        let result = serde_json::json!({ "imported": imported, "skipped": skipped });
        let _ = self
            .server
            .complete_task(task_id, self.worker_id, Some(summary), Some(result))
            .await;
    }

    async fn push(&self, task_id: Uuid, card_title: &str, description: &str) {
        let Some(client) = self.client() else {
            self.fail(task_id, "jira not configured").await;
            return;
        };
        let Some(config) = JiraConfig::load() else {
            self.fail(task_id, "jira not configured").await;
            return;
        };
        let Some(project) = config.default_project.as_deref() else {
            self.fail(task_id, "jira config has no default_project").await;
            return;
        };

        self.progress(task_id, "Creating Jira issue...").await;
        match client
            .create_issue(project, &config.default_issue_type, card_title, description, &config.default_labels)
            .await
        {
            Ok(issue) => {
                let summary = format!("Created Jira issue {}", issue.key);
                let result = serde_json::json!({ "key": issue.key, "browse_url": issue.browse_url });
                let _ = self
                    .server
                    .complete_task(task_id, self.worker_id, Some(summary), Some(result))
                    .await;
            }
            Err(e) => self.fail(task_id, &e.to_string()).await,
        }
    }

    /// Bidirectional reconciliation between Kira cards and their linked
    /// Jira issues isn't implemented yet; this completes as a no-op
    /// placeholder so `jira_sync` tasks don't stall the pipeline.
    async fn sync(&self, task_id: Uuid) {
        let _ = self
            .server
            .complete_task(task_id, self.worker_id, Some("jira_sync is a no-op".to_string()), None)
            .await;
    }

    async fn progress(&self, task_id: Uuid, text: impl Into<String>) {
        let _ = self
            .server
            .report_progress(task_id, self.worker_id, Some(text.into()), None, None, None)
            .await;
    }

    async fn fail(&self, task_id: Uuid, error_summary: &str) {
        error!(task_id = %task_id, error = error_summary, "jira task failed");
        let _ = self
            .server
            .fail_task(task_id, self.worker_id, error_summary.to_string(), None)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kira_core::types::TaskType;

    #[test]
    fn import_payload_carries_jql_and_column() {
        let task = Task::new(
            Uuid::new_v4(),
            TaskType::JiraImport,
            TaskPayload::JiraImport {
                jql: "project = KIRA".to_string(),
                column_id: Uuid::new_v4(),
            },
        );
        assert!(matches!(task.payload, TaskPayload::JiraImport { .. }));
    }
}
