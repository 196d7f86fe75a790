//! Executes `gitlab_create_project` and `gitlab_push` tasks, direct
//! translation of `original_source/src/kira/worker/executors/gitlab.py`.
//!
//! `gitlab_push` runs a sequential `git checkout -b` / `add -A` / `commit -m`
//! / `push -u` subprocess chain in the resolved workspace, then optionally
//! opens a merge request through [`kira_integrations::gitlab::GitLabClient`].
//! An MR-creation failure after a successful push is reported as partial
//! success, not a task failure.

use std::path::Path;

use kira_core::types::{Task, TaskPayload};
use kira_integrations::gitlab::{GitLabClient, GitLabConfig};
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::ServerClient;

pub struct GitLabExecutor<'a> {
    server: &'a ServerClient,
    worker_id: Uuid,
}

impl<'a> GitLabExecutor<'a> {
    pub fn new(server: &'a ServerClient, worker_id: Uuid) -> Self {
        Self { server, worker_id }
    }

    pub async fn execute(&self, task: &Task, working_dir: Option<&Path>) {
        match &task.payload {
            TaskPayload::GitlabCreateProject { name, description } => {
                self.create_project(task.id, name, description.as_deref()).await
            }
            TaskPayload::GitlabPush {
                project_id,
                default_branch,
                mr_prefix,
                card_title,
                branch_name,
                create_mr,
                commit_message,
                ..
            } => {
                self.push(
                    task,
                    *project_id,
                    default_branch.as_deref(),
                    mr_prefix.as_deref(),
                    card_title.as_deref(),
                    branch_name.as_deref(),
                    *create_mr,
                    commit_message.as_deref(),
                    working_dir,
                )
                .await
            }
            _ => self.fail(task.id, "gitlab executor received a non-gitlab payload").await,
        }
    }

    async fn client(&self) -> Option<GitLabClient> {
        let config = GitLabConfig::load()?;
        GitLabClient::new_with_url(&config.server, &config.token).ok()
    }

    async fn create_project(&self, task_id: Uuid, name: &str, description: Option<&str>) {
        if name.is_empty() {
            self.fail(task_id, "gitlab_create_project requires 'name'").await;
            return;
        }
        let Some(client) = self.client().await else {
            self.fail(task_id, "gitlab not configured").await;
            return;
        };
        self.progress(task_id, "Creating GitLab project...").await;
        match client.create_project(name, description).await {
            Ok(project) => {
                let summary = format!("Created GitLab project {}", project.path_with_namespace);
                let result = serde_json::json!({
                    "project_id": project.id,
                    "path_with_namespace": project.path_with_namespace,
                    "web_url": project.web_url,
                    "default_branch": project.default_branch,
                });
                let _ = self
                    .server
                    .complete_task(task_id, self.worker_id, Some(summary), Some(result))
                    .await;
            }
            Err(e) => self.fail(task_id, &e.to_string()).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn push(
        &self,
        task: &Task,
        project_id: u64,
        default_branch: Option<&str>,
        mr_prefix: Option<&str>,
        card_title: Option<&str>,
        branch_name: Option<&str>,
        create_mr: bool,
        commit_message: Option<&str>,
        working_dir: Option<&Path>,
    ) {
        let Some(dir) = working_dir else {
            self.fail(task.id, "gitlab_push requires a resolved workspace").await;
            return;
        };

        let card_prefix: String = task
            .card_id
            .map(|id| id.to_string().chars().take(8).collect())
            .unwrap_or_else(|| "task".to_string());
        let title_slug = slugify(card_title.or(task.prompt_text.as_deref()).unwrap_or("changes"));
        let prefix = mr_prefix.unwrap_or("kira/");
        let branch = branch_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{prefix}{card_prefix}-{title_slug}"));
        let message = commit_message
            .map(str::to_string)
            .unwrap_or_else(|| format!("kira: {title_slug}"));
        let default_branch = default_branch.unwrap_or("main");

        self.progress(task.id, format!("Pushing branch {branch}...")).await;

        for args in [
            vec!["checkout", "-b", &branch],
            vec!["add", "-A"],
            vec!["commit", "-m", &message],
            vec!["push", "-u", "origin", &branch],
        ] {
            if let Err(e) = self.run_git(dir, &args).await {
                self.fail(task.id, &e).await;
                return;
            }
        }

        let mut result = serde_json::json!({ "branch_name": branch });

        if create_mr {
            match self.client().await {
                Some(client) => {
                    match client
                        .create_merge_request(&project_id.to_string(), &message, &branch, default_branch)
                        .await
                    {
                        Ok(mr) => {
                            result["mr_iid"] = serde_json::json!(mr.iid);
                            result["mr_web_url"] = serde_json::json!(mr.web_url);
                        }
                        Err(e) => {
                            // Push already succeeded; an MR failure is a
                            // partial success, not a task failure.
                            warn!(task_id = %task.id, error = %e, "merge request creation failed after successful push");
                            result["mr_error"] = serde_json::json!(e.to_string());
                        }
                    }
                }
                None => {
                    result["mr_error"] = serde_json::json!("gitlab not configured");
                }
            }
        }

        info!(task_id = %task.id, branch, "push completed");
        let _ = self
            .server
            .complete_task(
                task.id,
                self.worker_id,
                Some(format!("Pushed branch {branch}")),
                Some(result),
            )
            .await;
    }

    async fn run_git(&self, dir: &Path, args: &[&str]) -> Result<(), String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| format!("git {}: {e}", args.join(" ")))?;
        if !output.status.success() {
            return Err(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }

    async fn progress(&self, task_id: Uuid, text: impl Into<String>) {
        let _ = self
            .server
            .report_progress(task_id, self.worker_id, Some(text.into()), None, None, None)
            .await;
    }

    async fn fail(&self, task_id: Uuid, error_summary: &str) {
        error!(task_id = %task_id, error = error_summary, "gitlab task failed");
        let _ = self
            .server
            .fail_task(task_id, self.worker_id, error_summary.to_string(), None)
            .await;
    }
}

/// Lowercase, collapse runs of non-`[a-z0-9]` to `-`, strip leading/trailing
/// `-`, truncate to 50 chars. Idempotent: `slugify(slugify(s)) ==
/// slugify(s)`.
pub fn slugify(input: &str) -> String {
    let lower = input.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut last_was_dash = false;
    for c in lower.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    trimmed.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_strips() {
        assert_eq!(slugify("Fix the Bug!!"), "fix-the-bug");
        assert_eq!(slugify("  leading and trailing  "), "leading-and-trailing");
        assert_eq!(slugify("___"), "");
    }

    #[test]
    fn slugify_truncates_to_50() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long).len(), 50);
    }

    #[test]
    fn slugify_is_idempotent() {
        let s = "Add Error Handling to the Widget Factory, Please!";
        assert_eq!(slugify(&slugify(s)), slugify(s));
    }

    #[test]
    fn slugify_only_contains_allowed_chars() {
        let s = slugify("Héllo Wörld 123 @@@");
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!s.starts_with('-') && !s.ends_with('-'));
    }
}
