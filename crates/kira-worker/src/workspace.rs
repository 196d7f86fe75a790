//! Resolves a board's working directory before a task executes, direct
//! translation of `original_source/src/kira/worker/workspace.py`.

use kira_core::types::BoardSettings;
use kira_integrations::gitlab::GitLabConfig;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    workspace_root: PathBuf,
}

impl WorkspaceResolver {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    /// Local path takes precedence over a GitLab clone; absence of both
    /// yields `None`, meaning the worker's own cwd is used.
    pub async fn resolve(&self, settings: Option<&BoardSettings>) -> Option<PathBuf> {
        let settings = settings?;

        if let Some(local_path) = settings.workspace.local_path.as_deref().filter(|s| !s.is_empty()) {
            let path = shellexpand_home(local_path);
            return if path.is_dir() {
                info!(path = %path.display(), "using local workspace");
                Some(path)
            } else {
                warn!(path = %path.display(), "local workspace path does not exist");
                None
            };
        }

        if let Some(project) = settings
            .workspace
            .gitlab_project
            .as_deref()
            .filter(|s| !s.is_empty())
        {
            return self.clone_or_pull(project).await;
        }

        None
    }

    async fn clone_or_pull(&self, project_path: &str) -> Option<PathBuf> {
        let dir_name = project_path.replace(['/', '\\'], "-");
        let clone_dir = self.workspace_root.join(dir_name);

        if clone_dir.join(".git").is_dir() {
            info!(project = project_path, dir = %clone_dir.display(), "pulling latest");
            let output = Command::new("git")
                .args(["pull", "--ff-only"])
                .current_dir(&clone_dir)
                .output()
                .await;
            if let Ok(output) = output {
                if !output.status.success() {
                    warn!(
                        project = project_path,
                        stderr = %String::from_utf8_lossy(&output.stderr),
                        "git pull failed"
                    );
                }
            }
            return Some(clone_dir);
        }

        let config = GitLabConfig::load()?;
        if config.token.is_empty() {
            warn!(project = project_path, "gitlab not configured, cannot clone");
            return None;
        }

        let clone_url = format!("{}/{project_path}.git", config.server.trim_end_matches('/'));

        info!(url = %clone_url, dir = %clone_dir.display(), "cloning");
        if let Some(parent) = clone_dir.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let output = Command::new("git")
            .args(["clone", &clone_url])
            .arg(&clone_dir)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            warn!(
                project = project_path,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "git clone failed"
            );
            return None;
        }

        Some(clone_dir)
    }
}

fn shellexpand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kira_core::types::WorkspaceBoardSettings;

    #[tokio::test]
    async fn no_workspace_settings_returns_none() {
        let resolver = WorkspaceResolver::new("/tmp/kira-workspaces");
        assert!(resolver.resolve(None).await.is_none());
    }

    #[tokio::test]
    async fn nonexistent_local_path_returns_none() {
        let resolver = WorkspaceResolver::new("/tmp/kira-workspaces");
        let settings = BoardSettings {
            workspace: WorkspaceBoardSettings {
                local_path: Some("/definitely/does/not/exist/anywhere".to_string()),
                gitlab_project: None,
            },
            ..Default::default()
        };
        assert!(resolver.resolve(Some(&settings)).await.is_none());
    }

    #[tokio::test]
    async fn existing_local_path_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = WorkspaceResolver::new("/tmp/kira-workspaces");
        let settings = BoardSettings {
            workspace: WorkspaceBoardSettings {
                local_path: Some(dir.path().to_string_lossy().to_string()),
                gitlab_project: None,
            },
            ..Default::default()
        };
        let resolved = resolver.resolve(Some(&settings)).await.unwrap();
        assert_eq!(resolved, dir.path());
    }
}
