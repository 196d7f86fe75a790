//! HTTP client for the server↔worker wire contract, grounded 1:1 on
//! `original_source/src/kira/worker/client.py`'s `ServerClient`/`ServerError`.

use kira_api_types::{
    BoardSettingsResponse, ClaimTaskRequest, CompleteTaskRequest, CreateCardRequest,
    CreateColumnRequest, FailTaskRequest, HeartbeatRequest, HeartbeatResponse, LoginRequest,
    LoginResponse, ProgressRequest, RegisterWorkerRequest, RegisterWorkerResponse,
    TaskMutationResponse, UpdateBoardRequest, UpdateColumnRequest,
};
use kira_core::types::{BoardSettings, Card, Column, Task};
use reqwest::StatusCode;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 409 on claim — "another worker got it", never an error the caller
    /// should log as a failure.
    #[error("task already claimed")]
    Conflict,

    #[error("unauthorized")]
    Unauthorized,

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
}

/// Thin `reqwest`-based client carrying a bearer token, mirroring the
/// Python `ServerClient`'s constructor and method surface.
#[derive(Debug, Clone)]
pub struct ServerClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ServerClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            http: reqwest::Client::new(),
        }
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ServerError> {
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::CONFLICT => Err(ServerError::Conflict),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ServerError::Unauthorized),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(ServerError::Server {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    pub async fn login(&self, username: &str, password: Option<&str>) -> Result<LoginResponse, ServerError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.map(str::to_string),
            })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn register_worker(
        &self,
        hostname: &str,
        worker_version: &str,
        capabilities: Vec<String>,
    ) -> Result<RegisterWorkerResponse, ServerError> {
        let resp = self
            .auth(self.http.post(self.url("/workers/register")))
            .json(&RegisterWorkerRequest {
                hostname: hostname.to_string(),
                worker_version: worker_version.to_string(),
                capabilities,
            })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn heartbeat(
        &self,
        worker_id: Uuid,
        running_task_ids: Vec<Uuid>,
        system_load: f64,
    ) -> Result<HeartbeatResponse, ServerError> {
        let resp = self
            .auth(self.http.post(self.url("/workers/heartbeat")))
            .json(&HeartbeatRequest {
                worker_id,
                running_task_ids,
                system_load,
            })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Poll replies with a flat JSON array on the wire; this client also
    /// tolerates a `{"tasks": [...]}` envelope, preserving the original's
    /// dual-shape handling 1:1.
    pub async fn poll_tasks(&self, worker_id: Uuid, limit: usize) -> Result<Vec<Task>, ServerError> {
        let resp = self
            .auth(self.http.get(self.url("/workers/tasks/poll")))
            .query(&[("worker_id", worker_id.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let value: serde_json::Value = resp.json().await?;
        let tasks = if let Some(arr) = value.as_array() {
            serde_json::from_value(serde_json::Value::Array(arr.clone()))
        } else if let Some(arr) = value.get("tasks") {
            serde_json::from_value(arr.clone())
        } else {
            Ok(Vec::new())
        };
        tasks.map_err(|e| ServerError::Server {
            status: 0,
            body: format!("malformed poll response: {e}"),
        })
    }

    pub async fn claim_task(&self, task_id: Uuid, worker_id: Uuid) -> Result<Task, ServerError> {
        let resp = self
            .auth(self.http.post(self.url(&format!("/workers/tasks/{task_id}/claim"))))
            .json(&ClaimTaskRequest { worker_id })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn report_progress(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        progress_text: Option<String>,
        step: Option<i64>,
        total_steps: Option<i64>,
        phase: Option<String>,
    ) -> Result<(), ServerError> {
        let resp = self
            .auth(self.http.post(self.url(&format!("/workers/tasks/{task_id}/progress"))))
            .json(&ProgressRequest {
                worker_id,
                progress_text,
                step,
                total_steps,
                phase,
            })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn complete_task(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        output_text: Option<String>,
        result_data: Option<serde_json::Value>,
    ) -> Result<TaskMutationResponse, ServerError> {
        let resp = self
            .auth(self.http.post(self.url(&format!("/workers/tasks/{task_id}/complete"))))
            .json(&CompleteTaskRequest {
                worker_id,
                output_text,
                result_data,
            })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn get_board_settings(&self, board_id: Uuid) -> Result<BoardSettings, ServerError> {
        let resp = self
            .auth(self.http.get(self.url(&format!("/boards/{board_id}/settings"))))
            .send()
            .await?;
        let body: BoardSettingsResponse = Self::check(resp).await?.json().await?;
        Ok(body.settings)
    }

    pub async fn update_board(
        &self,
        board_id: Uuid,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<(), ServerError> {
        let resp = self
            .auth(self.http.patch(self.url(&format!("/boards/{board_id}"))))
            .json(&UpdateBoardRequest { name, description })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn create_column(
        &self,
        board_id: Uuid,
        name: &str,
        color: Option<&str>,
        agent_type: Option<&str>,
        auto_run: bool,
    ) -> Result<Column, ServerError> {
        let resp = self
            .auth(self.http.post(self.url(&format!("/boards/{board_id}/columns"))))
            .json(&CreateColumnRequest {
                name: name.to_string(),
                color: color.map(str::to_string),
                agent_type: agent_type.map(str::to_string),
                auto_run,
            })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn update_column(
        &self,
        column_id: Uuid,
        on_success_column_id: Option<Uuid>,
        on_failure_column_id: Option<Uuid>,
    ) -> Result<(), ServerError> {
        let resp = self
            .auth(self.http.patch(self.url(&format!("/columns/{column_id}"))))
            .json(&UpdateColumnRequest {
                on_success_column_id,
                on_failure_column_id,
            })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    pub async fn create_card(
        &self,
        column_id: Uuid,
        title: &str,
        description: &str,
        priority: &str,
        labels: Vec<String>,
    ) -> Result<Card, ServerError> {
        let resp = self
            .auth(self.http.post(self.url("/cards")))
            .json(&CreateCardRequest {
                column_id,
                title: title.to_string(),
                description: description.to_string(),
                priority: priority.to_string(),
                labels,
            })
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn fail_task(
        &self,
        task_id: Uuid,
        worker_id: Uuid,
        error_summary: String,
        output_text: Option<String>,
    ) -> Result<(), ServerError> {
        let resp = self
            .auth(self.http.post(self.url(&format!("/workers/tasks/{task_id}/fail"))))
            .json(&FailTaskRequest {
                worker_id,
                error_summary,
                output_text,
            })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trims_trailing_slash() {
        let client = ServerClient::new("http://localhost:8787/", None);
        assert_eq!(client.url("/auth/login"), "http://localhost:8787/auth/login");
    }

    #[test]
    fn set_token_updates_in_place() {
        let mut client = ServerClient::new("http://localhost:8787", None);
        assert!(client.token.is_none());
        client.set_token("abc".to_string());
        assert_eq!(client.token.as_deref(), Some("abc"));
    }
}
