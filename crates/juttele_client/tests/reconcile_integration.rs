//! Block reconciliation: upsert, legacy deltas and history projection.

use juttele_client::api::{DataResponse, HistoryItem};
use juttele_client::messages::{InboundFrame, LegacyDelta};
use juttele_client::reconcile::{
    append_delta, append_delta_to_blocks, project_history, upsert, upsert_block,
};
use juttele_client::{Block, BlockKind, Chat, ChatStore, Role, StreamEvent};
use serde_json::json;

fn text(id: &str, content: &str) -> Block {
    Block::text(id, Role::Assistant, content)
}

fn contents(blocks: &[Block]) -> Vec<(String, String)> {
    blocks
        .iter()
        .map(|b| {
            let body = match &b.kind {
                BlockKind::Text { content, .. } | BlockKind::Thinking { content } => {
                    content.clone()
                }
                other => format!("{:?}", other),
            };
            (b.id.clone(), body)
        })
        .collect()
}

#[test]
fn upsert_new_id_appends() {
    let blocks = vec![text("a", "1"), text("b", "2")];
    let next = upsert_block(&blocks, text("c", "3"));
    assert_eq!(next.len(), 3);
    assert_eq!(next[2].id, "c");
    assert_eq!(blocks.len(), 2, "input is not mutated");
}

#[test]
fn upsert_existing_id_replaces_in_place() {
    let blocks = vec![text("a", "1"), text("b", "2"), text("c", "3")];
    let next = upsert_block(&blocks, text("b", "two"));
    assert_eq!(
        contents(&next),
        vec![
            ("a".into(), "1".into()),
            ("b".into(), "two".into()),
            ("c".into(), "3".into())
        ]
    );
}

#[test]
fn upsert_is_idempotent() {
    let blocks = vec![text("a", "1")];
    let once = upsert_block(&blocks, text("b", "2"));
    let twice = upsert_block(&once, text("b", "2"));
    assert_eq!(once, twice);
}

#[test]
fn replacement_may_change_block_type() {
    let blocks = vec![text("a", "1")];
    let next = upsert_block(&blocks, Block::thinking("a", "reconsidering"));
    assert_eq!(next.len(), 1);
    assert!(matches!(next[0].kind, BlockKind::Thinking { .. }));
}

#[test]
fn upsert_touches_only_the_target_chat() {
    let chats = vec![Chat::new(1, "one"), Chat::new(2, "two")];
    let next = upsert(&chats, 2, text("x", "hi"));
    assert!(next[0].blocks.is_empty());
    assert_eq!(next[1].blocks.len(), 1);

    let unchanged = upsert(&chats, 99, text("x", "hi"));
    assert_eq!(unchanged, chats);
}

#[test]
fn repeated_block_frames_converge_to_last_content() {
    let frames = [
        r#"{"jsonrpc":"2.0","method":"block","params":{"id":"r","ts":"2024-05-01T12:00:00Z","hash":"h","type":"text","role":"assistant","content":"4"}}"#,
        r#"{"jsonrpc":"2.0","method":"block","params":{"id":"r","ts":"2024-05-01T12:00:00Z","hash":"h","type":"text","role":"assistant","content":"4."}}"#,
    ];
    let mut store = ChatStore::with_chats(vec![Chat::new(1, "math")]);
    for frame in frames {
        let InboundFrame::Block(block) = InboundFrame::decode(frame).unwrap() else {
            panic!("expected block");
        };
        store.apply(1, &StreamEvent::Block(block));
    }
    let blocks = &store.chat(1).unwrap().blocks;
    assert_eq!(blocks.len(), 1);
    assert_eq!(contents(blocks), vec![("r".into(), "4.".into())]);
}

#[test]
fn content_deltas_extend_trailing_assistant_text() {
    let blocks = vec![Block::text("u", Role::User, "hello")];
    let next = append_delta_to_blocks(&blocks, &LegacyDelta::Content("Hi".into()));
    let next = append_delta_to_blocks(&next, &LegacyDelta::Content(" there".into()));
    assert_eq!(next.len(), 2);
    assert!(next[1].is_assistant_text());
    assert_eq!(contents(&next)[1].1, "Hi there");
}

#[test]
fn thinking_then_content_starts_a_new_block() {
    let mut blocks = Vec::new();
    for delta in [
        LegacyDelta::Thinking("a".into()),
        LegacyDelta::Thinking("b".into()),
        LegacyDelta::Content("c".into()),
        LegacyDelta::Thinking("d".into()),
    ] {
        blocks = append_delta_to_blocks(&blocks, &delta);
    }
    let bodies: Vec<String> = contents(&blocks).into_iter().map(|(_, b)| b).collect();
    assert_eq!(bodies, vec!["ab", "c", "d"]);
}

#[test]
fn error_delta_appends_error_block() {
    let chats = vec![Chat::new(4, "t")];
    let next = append_delta(&chats, 4, &LegacyDelta::Error("overloaded".into()));
    match &next[0].blocks[0].kind {
        BlockKind::Error { error } => assert_eq!(error.message, "overloaded"),
        other => panic!("expected error block, got {:?}", other),
    }
}

fn sample_history() -> Vec<HistoryItem> {
    serde_json::from_value(json!([
        {"kind":"message","data":{"role":"user","content":"list files"}},
        {"kind":"reasoning","data":{"content":"use the tool"}},
        {"kind":"message","data":{"role":"assistant","content":"","tool_calls":[
            {"id":"call_1","function":{"name":"list_files","arguments":"{}"}}
        ]}},
        {"kind":"message","data":{"role":"tool","content":"[\"a.rs\"]"}},
        {"kind":"message","data":{"role":"assistant","content":"There is a.rs"}}
    ]))
    .unwrap()
}

#[test]
fn history_projects_to_blocks_with_stable_ids() {
    let items = sample_history();
    let blocks = project_history(&items);
    let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "history-0",
            "history-1",
            "history-2",
            "history-2-tool-0",
            "history-4"
        ]
    );
    assert!(matches!(
        &blocks[0].kind,
        BlockKind::Text { role: Role::User, content } if content == "list files"
    ));
    assert!(matches!(blocks[1].kind, BlockKind::Thinking { .. }));
    assert!(matches!(
        &blocks[3].kind,
        BlockKind::ToolCall { name, args } if name == "list_files" && args == "{}"
    ));
    assert_eq!(project_history(&items), blocks);
}

#[test]
fn data_response_converts_to_chats() {
    let data: DataResponse = serde_json::from_value(json!({
        "chats": [{
            "id": 12,
            "created_at": "2024-05-01T12:00:00Z",
            "title": "files",
            "history": serde_json::to_value(sample_history()).unwrap()
        }]
    }))
    .unwrap();
    let chats: Vec<Chat> = data.chats.into_iter().map(|c| c.into_chat()).collect();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].id, 12);
    assert_eq!(chats[0].title, "files");
    assert_eq!(chats[0].blocks.len(), 5);

    let mut store = ChatStore::with_chats(chats);
    store.apply(12, &StreamEvent::Block(text("live", "new")));
    assert_eq!(store.chat(12).unwrap().blocks.len(), 6);
}

#[test]
fn events_for_unknown_chat_are_not_applied() {
    let mut store = ChatStore::with_chats(vec![Chat::new(1, "one")]);
    assert!(!store.apply(2, &StreamEvent::Block(text("x", "lost"))));
    assert!(!store.apply(2, &StreamEvent::Delta(LegacyDelta::Content("lost".into()))));
    assert!(store.chat(2).is_none());
    assert!(store.chat(1).unwrap().blocks.is_empty());

    assert!(store.apply(1, &StreamEvent::Block(text("x", "kept"))));
    store.ensure_chat(2);
    assert!(store.apply(2, &StreamEvent::Block(text("y", "now kept"))));
    assert_eq!(store.chats().len(), 2);
    assert_eq!(store.chat(2).unwrap().blocks.len(), 1);
}
