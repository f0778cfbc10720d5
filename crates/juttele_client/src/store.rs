//! In-memory chat list fed by exchanges.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::block::{Block, Chat, ChatId, Role};
use crate::client::{Client, Exchange, StreamEvent, TransportError};
use crate::messages::{SendRequest, StreamRequest};
use crate::reconcile::{append_delta, upsert, CLIENT_ERROR_CODE};
use crate::tools::ToolRegistry;

/// Chats plus the "a reply is being generated" flag.
#[derive(Debug, Clone, Default)]
pub struct ChatStore {
    chats: Vec<Chat>,
    generating: bool,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chats(chats: Vec<Chat>) -> Self {
        Self {
            chats,
            generating: false,
        }
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn chat(&self, chat_id: ChatId) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Add `chat`, replacing a chat with the same id.
    pub fn insert_chat(&mut self, chat: Chat) {
        match self.chats.iter_mut().find(|c| c.id == chat.id) {
            Some(existing) => *existing = chat,
            None => self.chats.push(chat),
        }
    }

    /// Fold one event into the chat. Returns whether any block changed.
    pub fn apply(&mut self, chat_id: ChatId, event: &StreamEvent) -> bool {
        if matches!(
            event,
            StreamEvent::ToolStarted { .. } | StreamEvent::ToolFinished { .. }
        ) {
            return false;
        }
        if self.chat(chat_id).is_none() {
            warn!(chat_id, "event for unknown chat, dropping");
            return false;
        }
        match event {
            StreamEvent::Block(block) => {
                self.chats = upsert(&self.chats, chat_id, block.clone());
                true
            }
            StreamEvent::Delta(delta) => {
                self.chats = append_delta(&self.chats, chat_id, delta);
                true
            }
            StreamEvent::ServerError(message) => {
                self.push_error(chat_id, message.clone());
                true
            }
            StreamEvent::ToolStarted { .. } | StreamEvent::ToolFinished { .. } => false,
        }
    }

    /// Make sure `chat_id` has an entry, creating an untitled chat if needed.
    pub fn ensure_chat(&mut self, chat_id: ChatId) {
        if self.chat(chat_id).is_none() {
            debug!(chat_id, "creating local entry for chat");
            self.chats.push(Chat::new(chat_id, ""));
        }
    }

    /// Append the local echo of a user message.
    pub fn push_user_message(&mut self, chat_id: ChatId, content: &str) -> Block {
        let block = Block::text(uuid::Uuid::new_v4().to_string(), Role::User, content);
        self.chats = upsert(&self.chats, chat_id, block.clone());
        block
    }

    pub fn push_error(&mut self, chat_id: ChatId, message: impl Into<String>) {
        let block = Block::error(
            uuid::Uuid::new_v4().to_string(),
            CLIENT_ERROR_CODE,
            message,
        );
        self.chats = upsert(&self.chats, chat_id, block);
    }

    /// Consume `exchange` into `chat_id`, calling `observe` after each event
    /// is applied. A failed exchange leaves an error block; a cancelled one
    /// does not. `generating` is cleared on every path.
    pub async fn drive<F>(
        &mut self,
        chat_id: ChatId,
        mut exchange: Exchange,
        mut observe: F,
    ) -> Result<(), TransportError>
    where
        F: FnMut(&StreamEvent, &ChatStore),
    {
        self.generating = true;
        while let Some(event) = exchange.next_event().await {
            self.apply(chat_id, &event);
            observe(&event, self);
        }
        let outcome = exchange.finish().await;
        self.generating = false;
        match &outcome {
            Ok(()) => debug!(chat_id, "exchange applied"),
            Err(TransportError::Cancelled) => debug!(chat_id, "exchange cancelled"),
            Err(e) => {
                warn!(chat_id, error = %e, "exchange failed");
                self.push_error(chat_id, e.to_string());
            }
        }
        outcome
    }

    /// Echo the user message, then run a duplex exchange for it.
    pub async fn send<F>(
        &mut self,
        client: &Client,
        chat_id: ChatId,
        request: &SendRequest,
        tools: Arc<ToolRegistry>,
        observe: F,
    ) -> Result<(), TransportError>
    where
        F: FnMut(&StreamEvent, &ChatStore),
    {
        self.ensure_chat(chat_id);
        self.push_user_message(chat_id, &request.content);
        self.generating = true;
        let exchange = match client.open(chat_id, request, tools).await {
            Ok(exchange) => exchange,
            Err(e) => return Err(self.fail_open(chat_id, e)),
        };
        self.drive(chat_id, exchange, observe).await
    }

    /// Echo the user message, then run a one-way stream for it.
    pub async fn send_stream<F>(
        &mut self,
        client: &Client,
        chat_id: ChatId,
        request: &StreamRequest,
        observe: F,
    ) -> Result<(), TransportError>
    where
        F: FnMut(&StreamEvent, &ChatStore),
    {
        self.ensure_chat(chat_id);
        self.push_user_message(chat_id, &request.content);
        self.generating = true;
        let exchange = match client.open_stream(chat_id, request).await {
            Ok(exchange) => exchange,
            Err(e) => return Err(self.fail_open(chat_id, e)),
        };
        self.drive(chat_id, exchange, observe).await
    }

    fn fail_open(&mut self, chat_id: ChatId, error: TransportError) -> TransportError {
        warn!(chat_id, error = %error, "could not open exchange");
        self.generating = false;
        self.push_error(chat_id, error.to_string());
        error
    }
}
