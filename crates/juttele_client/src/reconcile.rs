//! Merging incoming blocks and deltas into a chat's ordered block sequence.
//!
//! All functions here are pure: they take the current state by reference and
//! return the next state. Blocks are keyed by `id` and keep the position of
//! their first insertion.

use tracing::debug;

use crate::api::{HistoryItem, HistoryRole};
use crate::block::{Block, BlockKind, Chat, ChatId, ErrorInfo, Role};
use crate::messages::LegacyDelta;

/// Error code used for error blocks synthesized on the client.
pub const CLIENT_ERROR_CODE: i64 = -32000;

/// Insert `block`, or replace the block with the same id in place.
pub fn upsert_block(blocks: &[Block], block: Block) -> Vec<Block> {
    let mut next = blocks.to_vec();
    match next.iter().position(|b| b.id == block.id) {
        Some(idx) => next[idx] = block,
        None => next.push(block),
    }
    next
}

/// [`upsert_block`] applied to the chat with `chat_id`; other chats are untouched.
pub fn upsert(chats: &[Chat], chat_id: ChatId, block: Block) -> Vec<Chat> {
    chats
        .iter()
        .map(|chat| {
            if chat.id != chat_id {
                return chat.clone();
            }
            Chat {
                blocks: upsert_block(&chat.blocks, block.clone()),
                ..chat.clone()
            }
        })
        .collect()
}

/// Apply an identity-less delta to the in-flight assistant item.
///
/// Content extends a trailing assistant text block, thinking extends a
/// trailing thinking block; otherwise a new block is started. An error delta
/// appends an error block.
pub fn append_delta_to_blocks(blocks: &[Block], delta: &LegacyDelta) -> Vec<Block> {
    let mut next = blocks.to_vec();
    match delta {
        LegacyDelta::Content(fragment) => {
            if let Some(Block {
                kind:
                    BlockKind::Text {
                        role: Role::Assistant,
                        content,
                    },
                hash,
                ..
            }) = next.last_mut()
            {
                content.push_str(fragment);
                hash.clear();
            } else {
                next.push(Block::generated(BlockKind::Text {
                    role: Role::Assistant,
                    content: fragment.clone(),
                }));
            }
        }
        LegacyDelta::Thinking(fragment) => {
            if let Some(Block {
                kind: BlockKind::Thinking { content },
                hash,
                ..
            }) = next.last_mut()
            {
                content.push_str(fragment);
                hash.clear();
            } else {
                next.push(Block::generated(BlockKind::Thinking {
                    content: fragment.clone(),
                }));
            }
        }
        LegacyDelta::Error(message) => {
            next.push(Block::generated(BlockKind::Error {
                error: ErrorInfo {
                    code: CLIENT_ERROR_CODE,
                    message: message.clone(),
                },
            }));
        }
    }
    next
}

pub fn append_delta(chats: &[Chat], chat_id: ChatId, delta: &LegacyDelta) -> Vec<Chat> {
    chats
        .iter()
        .map(|chat| {
            if chat.id != chat_id {
                return chat.clone();
            }
            Chat {
                blocks: append_delta_to_blocks(&chat.blocks, delta),
                ..chat.clone()
            }
        })
        .collect()
}

/// Project persisted history into blocks.
///
/// Ids are derived from the item position, so projecting the same history
/// twice yields the same ids.
pub fn project_history(items: &[HistoryItem]) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match item {
            HistoryItem::Message(message) => {
                let role = match message.role {
                    HistoryRole::User => Role::User,
                    HistoryRole::Assistant => Role::Assistant,
                    HistoryRole::Tool => {
                        debug!(idx, "skipping tool message in history");
                        continue;
                    }
                };
                blocks.push(Block {
                    id: format!("history-{}", idx),
                    ts: None,
                    hash: String::new(),
                    kind: BlockKind::Text {
                        role,
                        content: message.content.clone(),
                    },
                });
                if role == Role::Assistant {
                    for (n, call) in message.tool_calls.iter().enumerate() {
                        blocks.push(Block {
                            id: format!("history-{}-tool-{}", idx, n),
                            ts: None,
                            hash: String::new(),
                            kind: BlockKind::ToolCall {
                                name: call.function.name.clone(),
                                args: call.function.arguments.clone(),
                            },
                        });
                    }
                }
            }
            HistoryItem::Reasoning(reasoning) => blocks.push(Block {
                id: format!("history-{}", idx),
                ts: None,
                hash: String::new(),
                kind: BlockKind::Thinking {
                    content: reasoning.content.clone(),
                },
            }),
        }
    }
    blocks
}
