//! Conversation blocks: the unit the backend pushes and the UI renders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric chat identity as assigned by the backend.
pub type ChatId = i64;

/// Speaker of a text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// `{code, message}` pair carried by tool and error blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i64,
    pub message: String,
}

/// One addressable unit of conversation content.
///
/// `id` is the reconciliation key. `ts` is informational only; ordering is
/// by insertion. Blocks projected from history carry no `ts` or `hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash: String,
    #[serde(flatten)]
    pub kind: BlockKind,
}

/// Discriminated block payload; the JSON discriminator is `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Text {
        role: Role,
        content: String,
    },
    Thinking {
        content: String,
    },
    Tool {
        name: String,
        args: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },
    /// Older variant without a result slot.
    ToolCall {
        name: String,
        args: String,
    },
    Error {
        error: ErrorInfo,
    },
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            ts: Some(Utc::now()),
            hash: String::new(),
            kind,
        }
    }

    /// A block with a freshly generated identity.
    pub fn generated(kind: BlockKind) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), kind)
    }

    pub fn text(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self::new(
            id,
            BlockKind::Text {
                role,
                content: content.into(),
            },
        )
    }

    pub fn thinking(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            id,
            BlockKind::Thinking {
                content: content.into(),
            },
        )
    }

    pub fn error(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::new(
            id,
            BlockKind::Error {
                error: ErrorInfo {
                    code,
                    message: message.into(),
                },
            },
        )
    }

    /// Short discriminator name, matching the wire `type` field.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            BlockKind::Text { .. } => "text",
            BlockKind::Thinking { .. } => "thinking",
            BlockKind::Tool { .. } => "tool",
            BlockKind::ToolCall { .. } => "tool_call",
            BlockKind::Error { .. } => "error",
        }
    }

    pub fn is_assistant_text(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::Text {
                role: Role::Assistant,
                ..
            }
        )
    }
}

/// A chat and its ordered blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Chat {
    pub fn new(id: ChatId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            created_at: Some(Utc::now()),
            blocks: Vec::new(),
        }
    }
}
