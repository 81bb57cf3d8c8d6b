use crate::{ClientError, error_from_response};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle as reported on the wire. Kept separate from the domain enum so
/// unknown remote states fail decoding here rather than deep in a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Creating,
    Running,
    Finished,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub id: String,
    pub status: RemoteStatus,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub prompt: String,
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPage {
    pub agents: Vec<AgentSnapshot>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn launch(&self, request: &LaunchRequest) -> Result<AgentSnapshot, ClientError>;
    async fn get(&self, id: &str) -> Result<AgentSnapshot, ClientError>;
    async fn follow_up(&self, id: &str, text: &str) -> Result<(), ClientError>;
    async fn stop(&self, id: &str) -> Result<(), ClientError>;
    async fn list(&self, cursor: Option<&str>) -> Result<AgentPage, ClientError>;
}

pub struct HttpAgentApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpAgentApi {
    pub fn new(base_url: String, token: String) -> Result<Self, ClientError> {
        if token.trim().is_empty() {
            return Err(ClientError::Unavailable);
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ClientError::from)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl AgentApi for HttpAgentApi {
    async fn launch(&self, request: &LaunchRequest) -> Result<AgentSnapshot, ClientError> {
        let response = self
            .client
            .post(self.url("/agents"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn get(&self, id: &str) -> Result<AgentSnapshot, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/agents/{id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn follow_up(&self, id: &str, text: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/agents/{id}/followup")))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "prompt": { "text": text } }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/agents/{id}/stop")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn list(&self, cursor: Option<&str>) -> Result<AgentPage, ClientError> {
        let mut request = self
            .client
            .get(self.url("/agents"))
            .bearer_auth(&self.token);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json().await?)
    }
}
