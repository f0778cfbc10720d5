//! Frame decoding and outbound message shapes.

use juttele_client::messages::{
    InboundFrame, LegacyDelta, RequestId, SendRequest, StreamMessage, StreamRequest,
    ToolCallRequest, ToolResponse,
};
use juttele_client::tools::ToolError;
use juttele_client::{BlockKind, DecodeError, ErrorInfo, Role};
use serde_json::{json, Value};

#[test]
fn decodes_block_notification() {
    let frame = InboundFrame::decode(
        r#"{"jsonrpc":"2.0","method":"block","params":{"id":"b-1","ts":"2024-05-01T12:00:00Z","hash":"h1","type":"text","role":"assistant","content":"Hi"}}"#,
    )
    .unwrap();
    let InboundFrame::Block(block) = frame else {
        panic!("expected block frame");
    };
    assert_eq!(block.id, "b-1");
    assert_eq!(block.hash, "h1");
    assert!(block.ts.is_some());
    assert_eq!(
        block.kind,
        BlockKind::Text {
            role: Role::Assistant,
            content: "Hi".into()
        }
    );
}

#[test]
fn decodes_every_block_variant() {
    let cases = [
        (json!({"type":"thinking","content":"hmm"}), "thinking"),
        (
            json!({"type":"tool","name":"grep","args":"{}","result":"[]"}),
            "tool",
        ),
        (
            json!({"type":"tool","name":"grep","args":"{}","error":{"code":-32005,"message":"nope"}}),
            "tool",
        ),
        (json!({"type":"tool_call","name":"grep","args":"{}"}), "tool_call"),
        (
            json!({"type":"error","error":{"code":500,"message":"boom"}}),
            "error",
        ),
    ];
    for (mut params, expected) in cases {
        params["id"] = json!("x");
        params["ts"] = json!("2024-05-01T12:00:00Z");
        params["hash"] = json!("h");
        let frame = json!({"jsonrpc":"2.0","method":"block","params":params});
        match InboundFrame::from_json(&frame) {
            Ok(InboundFrame::Block(block)) => assert_eq!(block.type_name(), expected),
            other => panic!("{} did not decode: {:?}", expected, other),
        }
    }
}

#[test]
fn legacy_tool_call_block_needs_no_timestamp() {
    let frame = json!({
        "jsonrpc": "2.0",
        "method": "block",
        "params": {"id":"c","type":"tool_call","name":"grep","args":"{}"}
    });
    let Ok(InboundFrame::Block(block)) = InboundFrame::from_json(&frame) else {
        panic!("expected block");
    };
    assert!(block.ts.is_none());
    assert_eq!(block.hash, "");
}

#[test]
fn tool_block_error_carries_code() {
    let frame = json!({
        "jsonrpc": "2.0",
        "method": "block",
        "params": {"id":"t","ts":"2024-05-01T12:00:00Z","hash":"h","type":"tool","name":"read_file","args":"{}","error":{"code":-32003,"message":"file not found: a.txt"}}
    });
    let Ok(InboundFrame::Block(block)) = InboundFrame::from_json(&frame) else {
        panic!("expected block");
    };
    match block.kind {
        BlockKind::Tool { result, error, .. } => {
            assert_eq!(result, None);
            assert_eq!(
                error,
                Some(ErrorInfo {
                    code: -32003,
                    message: "file not found: a.txt".into()
                })
            );
        }
        other => panic!("expected tool block, got {:?}", other),
    }
}

#[test]
fn decodes_tool_call_request() {
    let frame = InboundFrame::decode(
        r#"{"jsonrpc":"2.0","id":1,"method":"tool_call","params":{"name":"read_file","args":"{\"file_path\":\"a.txt\"}"}}"#,
    )
    .unwrap();
    assert_eq!(
        frame,
        InboundFrame::ToolCall(ToolCallRequest {
            id: RequestId::Number(1),
            name: "read_file".into(),
            args: r#"{"file_path":"a.txt"}"#.into(),
        })
    );

    let frame = InboundFrame::decode(
        r#"{"jsonrpc":"2.0","id":"abc","method":"tool_call","params":{"name":"x","args":""}}"#,
    )
    .unwrap();
    assert!(matches!(
        frame,
        InboundFrame::ToolCall(ToolCallRequest { id: RequestId::Text(ref s), .. }) if s == "abc"
    ));
}

#[test]
fn decodes_error_notification() {
    let frame =
        InboundFrame::decode(r#"{"jsonrpc":"2.0","method":"error","params":{"message":"no"}}"#)
            .unwrap();
    assert_eq!(frame, InboundFrame::ServerError("no".into()));
}

#[test]
fn rejects_malformed_frames() {
    let bad: [(&str, fn(&DecodeError) -> bool); 14] = [
        ("not json", |e| matches!(e, DecodeError::Json(_))),
        ("[1,2]", |e| matches!(e, DecodeError::NotAnObject)),
        (
            r#"{"method":"block","params":{}}"#,
            |e| matches!(e, DecodeError::Missing("jsonrpc")),
        ),
        (
            r#"{"jsonrpc":"1.0","method":"block","params":{}}"#,
            |e| matches!(e, DecodeError::Version(_)),
        ),
        (
            r#"{"jsonrpc":"2.0","params":{}}"#,
            |e| matches!(e, DecodeError::Missing("method")),
        ),
        (
            r#"{"jsonrpc":"2.0","method":"teleport","params":{}}"#,
            |e| matches!(e, DecodeError::UnknownMethod(_)),
        ),
        (
            r#"{"jsonrpc":"2.0","method":"block","params":{"id":"x","type":"video"}}"#,
            |e| matches!(e, DecodeError::Params { method: "block", .. }),
        ),
        (
            r#"{"jsonrpc":"2.0","method":"block","params":{"id":"x","hash":"h","type":"text","role":"assistant","content":"a"}}"#,
            |e| matches!(e, DecodeError::Missing("ts")),
        ),
        (
            r#"{"jsonrpc":"2.0","method":"block","params":{"id":"x","ts":"2024-05-01T12:00:00Z","type":"thinking","content":"a"}}"#,
            |e| matches!(e, DecodeError::Missing("hash")),
        ),
        (
            r#"{"jsonrpc":"2.0","method":"block","params":{"id":"x","hash":"h","type":"error","error":{"code":1,"message":"m"}}}"#,
            |e| matches!(e, DecodeError::Missing("ts")),
        ),
        (
            r#"{"jsonrpc":"2.0","method":"block","params":{"id":"x","ts":"2024-05-01T12:00:00Z","type":"tool","name":"n","args":"{}"}}"#,
            |e| matches!(e, DecodeError::Missing("hash")),
        ),
        (
            r#"{"jsonrpc":"2.0","method":"block","params":{"id":"x","ts":"yesterday","hash":"h","type":"thinking","content":"a"}}"#,
            |e| matches!(e, DecodeError::Params { method: "block", .. }),
        ),
        (
            r#"{"jsonrpc":"2.0","method":"tool_call","params":{"name":"x","args":"{}"}}"#,
            |e| matches!(e, DecodeError::Missing("id")),
        ),
        (
            r#"{"jsonrpc":"2.0","id":1.5,"method":"tool_call","params":{"name":"x","args":"{}"}}"#,
            |e| matches!(e, DecodeError::InvalidId(_)),
        ),
    ];
    for (text, check) in bad {
        match InboundFrame::decode(text) {
            Err(e) => assert!(check(&e), "{} produced unexpected error {:?}", text, e),
            Ok(frame) => panic!("{} should not decode, got {:?}", text, frame),
        }
    }
}

#[test]
fn tool_call_args_must_be_a_string() {
    let frame = json!({"jsonrpc":"2.0","id":2,"method":"tool_call","params":{"name":"x","args":{"a":1}}});
    assert!(matches!(
        InboundFrame::from_json(&frame),
        Err(DecodeError::Params { method: "tool_call", .. })
    ));
}

#[test]
fn stream_messages_distinguish_frames_and_deltas() {
    assert_eq!(
        StreamMessage::decode(r#"{"content":"Hel"}"#).unwrap(),
        StreamMessage::Delta(LegacyDelta::Content("Hel".into()))
    );
    assert_eq!(
        StreamMessage::decode(r#"{"thinking":"hm"}"#).unwrap(),
        StreamMessage::Delta(LegacyDelta::Thinking("hm".into()))
    );
    assert_eq!(
        StreamMessage::decode(r#"{"error":"bad"}"#).unwrap(),
        StreamMessage::Delta(LegacyDelta::Error("bad".into()))
    );
    assert!(matches!(
        StreamMessage::decode(r#"{"jsonrpc":"2.0","method":"error","params":{"message":"m"}}"#),
        Ok(StreamMessage::Frame(InboundFrame::ServerError(_)))
    ));
    for bad in [
        r#"{}"#,
        r#"{"content":"a","thinking":"b"}"#,
        r#"{"content":5}"#,
        r#"{"summary":"x"}"#,
    ] {
        assert!(StreamMessage::decode(bad).is_err(), "{} should be rejected", bad);
    }
}

#[test]
fn tool_response_shapes() {
    let ok: Value =
        serde_json::to_value(ToolResponse::success(RequestId::Number(4), "done".into())).unwrap();
    assert_eq!(ok, json!({"jsonrpc":"2.0","id":4,"result":"done"}));

    let err = ToolResponse::from_outcome(
        RequestId::Text("q".into()),
        Err(ToolError::FileNotFound("a.txt".into())),
    );
    assert!(err.is_error());
    let err: Value = serde_json::to_value(err).unwrap();
    assert_eq!(err["id"], "q");
    assert_eq!(err["error"]["code"], -32003);
    assert!(err.get("result").is_none());
}

#[test]
fn outbound_requests_serialize_expected_fields() {
    let send = SendRequest {
        model_id: "m".into(),
        personality_id: "p".into(),
        content: "hi".into(),
        tools: vec![],
        use_tools: true,
    };
    let value = serde_json::to_value(&send).unwrap();
    assert_eq!(
        value,
        json!({"model_id":"m","personality_id":"p","content":"hi","tools":[],"use_tools":true})
    );

    let stream = serde_json::to_value(StreamRequest::from(&send)).unwrap();
    assert_eq!(
        stream,
        json!({"model_id":"m","personality_id":"p","include_tools":true,"content":"hi"})
    );
}
