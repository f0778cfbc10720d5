//! Streaming chat client for the juttele backend.
//!
//! Opens completion exchanges (duplex WebSocket or one-way `data: ` stream),
//! reconciles the blocks they deliver into chats, and executes the backend's
//! tool calls against a local git workspace.

pub mod api;
pub mod block;
pub mod client;
pub mod config;
pub mod messages;
pub mod reconcile;
pub mod sse;
pub mod store;
pub mod tools;

pub use api::{ApiClient, ApiError};
pub use block::{Block, BlockKind, Chat, ChatId, ErrorInfo, Role};
pub use client::{
    channel_url, close_outcome, Client, ConnectionState, Exchange, StreamEvent, TransportError,
};
pub use config::{default_config_path, ClientConfig, Config, ConfigError};
pub use messages::{DecodeError, InboundFrame, LegacyDelta, RequestId, SendRequest, StreamRequest};
pub use store::ChatStore;
pub use tools::{Tool, ToolError, ToolRegistry};
