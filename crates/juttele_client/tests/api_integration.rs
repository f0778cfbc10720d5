//! REST endpoint client against an in-process HTTP responder.

use juttele_client::api::{ApiClient, ApiError};
use juttele_client::{BlockKind, ClientConfig};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct Captured {
    request_line: String,
    head: String,
    body: String,
}

/// Answer a single request with `status` and a JSON `body`.
async fn serve_once(
    status: &'static str,
    body: Value,
) -> (ClientConfig, tokio::task::JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut tcp, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            let n = tcp.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = tcp.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            buf.extend_from_slice(&chunk[..n]);
        }
        let payload = body.to_string();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        );
        tcp.write_all(response.as_bytes()).await.unwrap();
        let _ = tcp.shutdown().await;
        Captured {
            request_line: head.lines().next().unwrap_or_default().to_string(),
            body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
            head,
        }
    });
    let config = ClientConfig::new(format!("http://127.0.0.1:{}/", port), "api-key");
    (config, handle)
}

#[tokio::test]
async fn get_config_lists_models_and_personalities() {
    let (config, server) = serve_once(
        "200 OK",
        json!({"models":[{"id":"gpt","name":"GPT","personalities":[{"id":"p1","name":"Plain"}]}]}),
    )
    .await;
    let api = ApiClient::new(config);
    let cfg = api.get_config().await.unwrap();
    let captured = server.await.unwrap();

    assert_eq!(captured.request_line, "GET /config HTTP/1.1");
    assert!(captured
        .head
        .to_ascii_lowercase()
        .contains("authorization: bearer api-key"));
    assert_eq!(cfg.models.len(), 1);
    assert_eq!(cfg.models[0].personalities[0].name, "Plain");
}

#[tokio::test]
async fn load_chats_projects_history() {
    let (config, server) = serve_once(
        "200 OK",
        json!({"chats":[{
            "id": 3,
            "created_at": "2024-05-01T12:00:00Z",
            "title": "hello",
            "history": [
                {"kind":"message","data":{"role":"user","content":"hi"}},
                {"kind":"message","data":{"role":"assistant","content":"hey"}}
            ]
        }]}),
    )
    .await;
    let api = ApiClient::new(config);
    let chats = api.load_chats().await.unwrap();
    let captured = server.await.unwrap();

    assert_eq!(captured.request_line, "GET /data HTTP/1.1");
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].blocks.len(), 2);
    assert!(chats[0].blocks[1].is_assistant_text());
    assert!(matches!(&chats[0].blocks[0].kind, BlockKind::Text { content, .. } if content == "hi"));
}

#[tokio::test]
async fn create_chat_posts_named_operation() {
    let (config, server) = serve_once("200 OK", json!({"chat_id": 77})).await;
    let api = ApiClient::new(config);
    let id = api.create_chat("My chat").await.unwrap();
    let captured = server.await.unwrap();

    assert_eq!(id, 77);
    assert_eq!(captured.request_line, "POST /rpc HTTP/1.1");
    let body: Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(body, json!({"op":"create_chat","args":{"title":"My chat"}}));
}

#[tokio::test]
async fn rename_chat_sends_id_and_model() {
    let (config, server) = serve_once("200 OK", json!({"title":"Renamed"})).await;
    let api = ApiClient::new(config);
    let out = api.rename_chat(5, "gpt").await.unwrap();
    let captured = server.await.unwrap();

    assert_eq!(out["title"], "Renamed");
    let body: Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(body["op"], "rename_chat");
    assert_eq!(body["args"], json!({"id":5,"model_id":"gpt"}));
}

#[tokio::test]
async fn create_chat_without_id_is_an_error() {
    let (config, server) = serve_once("200 OK", json!({"ok": true})).await;
    let api = ApiClient::new(config);
    let err = api.create_chat("x").await.unwrap_err();
    server.await.unwrap();
    assert!(matches!(err, ApiError::Missing("chat_id")));
}

#[tokio::test]
async fn error_status_carries_body() {
    let (config, server) = serve_once("403 Forbidden", json!({"error":"bad key"})).await;
    let api = ApiClient::new(config);
    let err = api.get_data().await.unwrap_err();
    server.await.unwrap();
    match err {
        ApiError::Status { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("bad key"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}
