//! Wire message types for the completion stream. Client ↔ server JSON.
//!
//! Inbound frames are JSON-RPC 2.0 shaped. Decoding is a closed set: anything
//! that is not one of the known shapes is rejected with a [`DecodeError`] and
//! the caller drops the frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::{Block, BlockKind, ErrorInfo};
use crate::tools::ToolError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id of a tool-call request. Echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Server → client: request to run a local tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: RequestId,
    pub name: String,
    pub args: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    args: String,
}

#[derive(Debug, Deserialize)]
struct ErrorParams {
    message: String,
}

/// Block as pushed by the backend. `ts` and `hash` are required on every
/// variant except the older `tool_call`.
#[derive(Debug, Deserialize)]
struct BlockParams {
    id: String,
    #[serde(default)]
    ts: Option<DateTime<Utc>>,
    #[serde(default)]
    hash: Option<String>,
    #[serde(flatten)]
    kind: BlockKind,
}

impl TryFrom<BlockParams> for Block {
    type Error = DecodeError;

    fn try_from(p: BlockParams) -> Result<Self, DecodeError> {
        let legacy = matches!(p.kind, BlockKind::ToolCall { .. });
        if !legacy && p.ts.is_none() {
            return Err(DecodeError::Missing("ts"));
        }
        if !legacy && p.hash.is_none() {
            return Err(DecodeError::Missing("hash"));
        }
        Ok(Block {
            id: p.id,
            ts: p.ts,
            hash: p.hash.unwrap_or_default(),
            kind: p.kind,
        })
    }
}

/// One decoded server frame; discriminator is the JSON-RPC `method` field.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Full replacement of the block with this identity.
    Block(Block),
    ToolCall(ToolCallRequest),
    /// Backend rejected the exchange (`method: "error"`).
    ServerError(String),
}

/// Older, identity-less delta message of the unidirectional stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyDelta {
    Error(String),
    Thinking(String),
    Content(String),
}

/// Anything that may appear on a `data: ` line of the unidirectional stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Frame(InboundFrame),
    Delta(LegacyDelta),
}

/// Why a frame was rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("unsupported jsonrpc version: {0}")]
    Version(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("invalid {method} params: {source}")]
    Params {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid request id: {0}")]
    InvalidId(Value),
    #[error("unrecognized message shape")]
    UnknownShape,
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;
        match obj.get("jsonrpc") {
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(other) => return Err(DecodeError::Version(other.to_string())),
            None => return Err(DecodeError::Missing("jsonrpc")),
        }
        let method = obj
            .get("method")
            .and_then(|m| m.as_str())
            .ok_or(DecodeError::Missing("method"))?;
        let params = obj
            .get("params")
            .cloned()
            .ok_or(DecodeError::Missing("params"))?;
        match method {
            "block" => {
                let params: BlockParams = serde_json::from_value(params).map_err(|source| {
                    DecodeError::Params {
                        method: "block",
                        source,
                    }
                })?;
                Ok(InboundFrame::Block(Block::try_from(params)?))
            }
            "tool_call" => {
                let id = match obj.get("id") {
                    Some(Value::Number(n)) => n
                        .as_i64()
                        .map(RequestId::Number)
                        .ok_or_else(|| DecodeError::InvalidId(Value::Number(n.clone())))?,
                    Some(Value::String(s)) => RequestId::Text(s.clone()),
                    Some(other) => return Err(DecodeError::InvalidId(other.clone())),
                    None => return Err(DecodeError::Missing("id")),
                };
                let p: ToolCallParams =
                    serde_json::from_value(params).map_err(|source| DecodeError::Params {
                        method: "tool_call",
                        source,
                    })?;
                Ok(InboundFrame::ToolCall(ToolCallRequest {
                    id,
                    name: p.name,
                    args: p.args,
                }))
            }
            "error" => {
                let p: ErrorParams =
                    serde_json::from_value(params).map_err(|source| DecodeError::Params {
                        method: "error",
                        source,
                    })?;
                Ok(InboundFrame::ServerError(p.message))
            }
            other => Err(DecodeError::UnknownMethod(other.to_string())),
        }
    }
}

impl LegacyDelta {
    /// Exactly one of `error`, `thinking`, `content`, with a string value.
    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;
        if obj.len() != 1 {
            return Err(DecodeError::UnknownShape);
        }
        let (key, val) = obj.iter().next().ok_or(DecodeError::UnknownShape)?;
        let text = val.as_str().ok_or(DecodeError::UnknownShape)?.to_string();
        match key.as_str() {
            "error" => Ok(LegacyDelta::Error(text)),
            "thinking" => Ok(LegacyDelta::Thinking(text)),
            "content" => Ok(LegacyDelta::Content(text)),
            _ => Err(DecodeError::UnknownShape),
        }
    }
}

impl StreamMessage {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, DecodeError> {
        if value.get("jsonrpc").is_some() {
            InboundFrame::from_json(value).map(StreamMessage::Frame)
        } else {
            LegacyDelta::from_json(value).map(StreamMessage::Delta)
        }
    }
}

/// Advertised tool in the initiating request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub spec: Value,
}

/// Client → server: first frame of a duplex exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub model_id: String,
    pub personality_id: String,
    pub content: String,
    pub tools: Vec<ToolDescriptor>,
    pub use_tools: bool,
}

/// Client → server: body of the unidirectional stream request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub model_id: String,
    pub personality_id: String,
    pub include_tools: bool,
    pub content: String,
}

impl From<&SendRequest> for StreamRequest {
    fn from(req: &SendRequest) -> Self {
        Self {
            model_id: req.model_id.clone(),
            personality_id: req.personality_id.clone(),
            include_tools: req.use_tools,
            content: req.content.clone(),
        }
    }
}

/// Client → server: outcome of a tool call, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ToolResponse {
    pub fn success(id: RequestId, result: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn from_outcome(id: RequestId, outcome: Result<String, ToolError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(e) => Self::failure(id, e.code(), e.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
