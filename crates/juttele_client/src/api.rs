//! REST endpoints around the completion stream: model config, persisted
//! chats, and named operations.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::block::{Chat, ChatId};
use crate::config::ClientConfig;
use crate::reconcile::project_history;

/// `GET /config` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub personalities: Vec<Personality>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    pub id: String,
    pub name: String,
}

/// `GET /data` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub chats: Vec<ChatData>,
}

/// A persisted chat with its raw history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatData {
    pub id: ChatId,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub history: Vec<HistoryItem>,
}

impl ChatData {
    pub fn into_chat(self) -> Chat {
        Chat {
            id: self.id,
            title: self.title,
            created_at: Some(self.created_at),
            blocks: project_history(&self.history),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum HistoryItem {
    Message(HistoryMessage),
    Reasoning(HistoryReasoning),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<HistoryToolCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryToolCall {
    pub id: String,
    pub function: HistoryFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReasoning {
    pub content: String,
}

/// REST call error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response is missing {0}")]
    Missing(&'static str),
}

/// Client for the REST endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn get_config(&self) -> Result<ConfigResponse, ApiError> {
        self.get_json("/config").await
    }

    pub async fn get_data(&self) -> Result<DataResponse, ApiError> {
        self.get_json("/data").await
    }

    /// Persisted chats with history projected into blocks.
    pub async fn load_chats(&self) -> Result<Vec<Chat>, ApiError> {
        let data = self.get_data().await?;
        Ok(data.chats.into_iter().map(ChatData::into_chat).collect())
    }

    /// Invoke a named operation with `{op, args}`.
    pub async fn rpc(&self, op: &str, args: Value) -> Result<Value, ApiError> {
        debug!(op, "rpc call");
        let resp = self
            .http
            .post(format!("{}/rpc", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&json!({ "op": op, "args": args }))
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn create_chat(&self, title: &str) -> Result<ChatId, ApiError> {
        let value = self.rpc("create_chat", json!({ "title": title })).await?;
        value
            .get("chat_id")
            .and_then(Value::as_i64)
            .ok_or(ApiError::Missing("chat_id"))
    }

    pub async fn rename_chat(&self, chat_id: ChatId, model_id: &str) -> Result<Value, ApiError> {
        self.rpc("rename_chat", json!({ "id": chat_id, "model_id": model_id }))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self
            .http
            .get(format!("{}{}", self.config.base_url, path))
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}
