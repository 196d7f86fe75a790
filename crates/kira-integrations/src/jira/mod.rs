//! Jira RPC client for the `jira_import` / `jira_push` / `jira_sync`
//! executors.
//!
//! No Jira client exists elsewhere in this workspace's integrations crate
//! (only GitHub/GitLab/Linear); this module follows the *idiom* of
//! `gitlab::GitLabClient` — same `reqwest`-based shape, same `thiserror` enum,
//! same `is_stub_token` offline-testable branch — applied to the Jira REST
//! API v2 surface described by `original_source/src/kira/worker/executors/jira.py`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("Jira API error: {0}")]
    Api(String),

    #[error("missing Jira credentials")]
    MissingCredentials,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, JiraError>;

/// Loaded from `~/.kira/jira.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
    pub server: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub default_project: Option<String>,
    #[serde(default = "default_issue_type")]
    pub default_issue_type: String,
    #[serde(default)]
    pub default_labels: Vec<String>,
}

fn default_issue_type() -> String {
    "Task".to_string()
}

impl JiraConfig {
    pub fn default_path() -> std::path::PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".kira")
            .join("jira.yaml")
    }

    pub fn load() -> Option<Self> {
        let path = Self::default_path();
        let text = std::fs::read_to_string(path).ok()?;
        serde_yaml::from_str(&text).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssue {
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub priority: String,
    pub labels: Vec<String>,
    pub browse_url: String,
}

/// Maps Jira's priority names onto Kira's `{critical,high,medium,low}` card
/// priority vocabulary.
pub fn map_priority(jira_priority: &str) -> &'static str {
    match jira_priority {
        "Highest" => "critical",
        "High" => "high",
        "Medium" => "medium",
        "Low" | "Lowest" => "low",
        _ => "medium",
    }
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self> {
        if config.username.is_empty() || config.password.is_empty() {
            return Err(JiraError::MissingCredentials);
        }
        Ok(Self {
            base_url: config.server.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client: reqwest::Client::new(),
        })
    }

    /// Stub-mode detector mirroring `GitLabClient::is_stub_token`: a short
    /// or obviously-fake password keeps integration tests offline.
    fn is_stub(&self) -> bool {
        self.password.starts_with("stub") || self.password.starts_with("tok") || self.password.len() < 6
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }

    /// `jql` search, backing `jira_import`.
    pub async fn search(&self, jql: &str, max_results: u32) -> Result<Vec<JiraIssue>> {
        if self.is_stub() {
            let count = max_results.min(5).max(1);
            return Ok((1..=count)
                .map(|i| JiraIssue {
                    key: format!("KIRA-{i}"),
                    summary: format!("Stub issue matching `{jql}` #{i}"),
                    description: Some("Auto-generated stub issue".to_string()),
                    priority: "Medium".to_string(),
                    labels: vec!["stub".to_string()],
                    browse_url: self.browse_url(&format!("KIRA-{i}")),
                })
                .collect());
        }

        let url = format!("{}/rest/api/2/search", self.base_url);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("jql", jql), ("maxResults", &max_results.to_string())])
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(JiraError::Api(format!("{status}: {body}")));
        }
        let raw: JiraSearchResponse = resp.json().await?;
        Ok(raw
            .issues
            .into_iter()
            .map(|i| JiraIssue {
                key: i.key,
                summary: i.fields.summary,
                description: i.fields.description,
                priority: i
                    .fields
                    .priority
                    .map(|p| p.name)
                    .unwrap_or_else(|| "Medium".to_string()),
                labels: i.fields.labels,
                browse_url: self.browse_url(&i.key),
            })
            .collect())
    }

    /// Create an issue, backing `jira_push`.
    pub async fn create_issue(
        &self,
        project: &str,
        issue_type: &str,
        summary: &str,
        description: &str,
        labels: &[String],
    ) -> Result<JiraIssue> {
        if self.is_stub() {
            let key = format!("KIRA-{}", summary.len() + 100);
            return Ok(JiraIssue {
                key: key.clone(),
                summary: summary.to_string(),
                description: Some(description.to_string()),
                priority: "Medium".to_string(),
                labels: labels.to_vec(),
                browse_url: self.browse_url(&key),
            });
        }

        let url = format!("{}/rest/api/2/issue", self.base_url);
        let body = serde_json::json!({
            "fields": {
                "project": {"key": project},
                "summary": summary,
                "description": description,
                "issuetype": {"name": issue_type},
                "labels": labels,
            }
        });
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(JiraError::Api(format!("{status}: {body}")));
        }
        let created: JiraCreateResponse = resp.json().await?;
        Ok(JiraIssue {
            key: created.key.clone(),
            summary: summary.to_string(),
            description: Some(description.to_string()),
            priority: "Medium".to_string(),
            labels: labels.to_vec(),
            browse_url: self.browse_url(&created.key),
        })
    }
}

#[derive(Debug, Deserialize)]
struct JiraSearchResponse {
    issues: Vec<JiraSearchIssue>,
}

#[derive(Debug, Deserialize)]
struct JiraSearchIssue {
    key: String,
    fields: JiraSearchFields,
}

#[derive(Debug, Deserialize)]
struct JiraSearchFields {
    summary: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<JiraPriorityField>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JiraPriorityField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct JiraCreateResponse {
    key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> JiraConfig {
        JiraConfig {
            server: "https://kira.atlassian.net".to_string(),
            username: "bot@kira.dev".to_string(),
            password: "stub".to_string(),
            default_project: Some("KIRA".to_string()),
            default_issue_type: "Task".to_string(),
            default_labels: vec![],
        }
    }

    #[test]
    fn priority_mapping() {
        assert_eq!(map_priority("Highest"), "critical");
        assert_eq!(map_priority("High"), "high");
        assert_eq!(map_priority("Medium"), "medium");
        assert_eq!(map_priority("Low"), "low");
        assert_eq!(map_priority("Lowest"), "low");
        assert_eq!(map_priority("Unknown"), "medium");
    }

    #[test]
    fn missing_credentials_rejected() {
        let mut cfg = stub_config();
        cfg.password = String::new();
        assert!(JiraClient::new(&cfg).is_err());
    }

    #[tokio::test]
    async fn search_stub_returns_bounded_results() {
        let client = JiraClient::new(&stub_config()).unwrap();
        let issues = client.search("project = KIRA", 3).await.unwrap();
        assert_eq!(issues.len(), 3);
        assert!(issues[0].key.starts_with("KIRA-"));
    }

    #[tokio::test]
    async fn create_issue_stub() {
        let client = JiraClient::new(&stub_config()).unwrap();
        let issue = client
            .create_issue("KIRA", "Task", "Fix the widget", "details", &["bug".to_string()])
            .await
            .unwrap();
        assert_eq!(issue.summary, "Fix the widget");
        assert!(issue.browse_url.contains(&issue.key));
    }
}
