//! Completion transport.
//!
//! Two modes share one contract: [`Client::open`] runs a duplex WebSocket
//! exchange that also services tool calls locally, [`Client::open_stream`]
//! reads the older unidirectional `data: ` stream. Both hand back an
//! [`Exchange`] that yields [`StreamEvent`]s and finally a `Result`.

use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::block::{Block, ChatId};
use crate::config::ClientConfig;
use crate::messages::{
    InboundFrame, LegacyDelta, RequestId, SendRequest, StreamMessage, StreamRequest,
    ToolCallRequest, ToolResponse,
};
use crate::sse::SseLineBuffer;
use crate::tools::{ToolError, ToolRegistry};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code reported when the peer went away without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Events received during an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Full replacement of one block.
    Block(Block),
    /// Identity-less delta from the unidirectional stream.
    Delta(LegacyDelta),
    /// The backend rejected the exchange.
    ServerError(String),
    ToolStarted {
        id: RequestId,
        name: String,
    },
    ToolFinished {
        id: RequestId,
        name: String,
        error: Option<String>,
    },
}

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Draining,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

/// Connection-level failure; ends the exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidUrl(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("connection closed with code {code}: {reason}")]
    ConnectionClosed { code: u16, reason: String },
    #[error("stream read failed: {0}")]
    Read(String),
    #[error("failed to send frame: {0}")]
    Send(String),
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("exchange cancelled")]
    Cancelled,
    #[error("exchange task failed: {0}")]
    Join(String),
}

/// Close-code policy for the duplex channel.
///
/// `code` is `None` when the close frame carried no status. A preceding
/// transport error always fails the exchange.
pub fn close_outcome(
    code: Option<u16>,
    reason: &str,
    transport_error: Option<&str>,
) -> Result<(), TransportError> {
    if let Some(err) = transport_error {
        return Err(TransportError::ConnectionClosed {
            code: code.unwrap_or(CLOSE_ABNORMAL),
            reason: err.to_string(),
        });
    }
    match code {
        None | Some(1000) | Some(1001) | Some(1005) | Some(CLOSE_ABNORMAL) => Ok(()),
        Some(code) => Err(TransportError::ConnectionClosed {
            code,
            reason: reason.to_string(),
        }),
    }
}

/// Map the backend's http(s) origin to the duplex endpoint of `chat_id`.
pub fn channel_url(base_url: &str, chat_id: ChatId) -> Result<String, TransportError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(TransportError::InvalidUrl(base_url.to_string()));
    };
    Ok(format!("{}/chats/{}", ws_base, chat_id))
}

/// Handle on one in-flight exchange.
pub struct Exchange {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), TransportError>>,
}

impl Exchange {
    /// Next event, or `None` once the exchange ended or was cancelled.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Abandon the exchange. The connection is closed and no further events
    /// are delivered; tool executions already started run to completion and
    /// their results are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the exchange to end.
    pub async fn finish(self) -> Result<(), TransportError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(TransportError::Join(e.to_string())),
        }
    }

    /// Drain every event, then wait for the outcome.
    pub async fn collect(mut self) -> Result<Vec<StreamEvent>, TransportError> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        self.finish().await?;
        Ok(events)
    }
}

/// Completion transport bound to one backend.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a duplex exchange: connect, send `request`, then stream events
    /// while servicing tool calls from `tools`.
    pub async fn open(
        &self,
        chat_id: ChatId,
        request: &SendRequest,
        tools: Arc<ToolRegistry>,
    ) -> Result<Exchange, TransportError> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let url = channel_url(&self.config.base_url, chat_id)?;
        let mut ws_request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        ws_request.headers_mut().insert(AUTHORIZATION, bearer);
        let payload = serde_json::to_string(request)?;

        state_tx.send_replace(ConnectionState::Connecting);
        info!(chat_id, url = %url, "opening duplex channel");
        let mut ws = match tokio_tungstenite::connect_async(ws_request).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                state_tx.send_replace(ConnectionState::Failed);
                return Err(TransportError::Connect(e.to_string()));
            }
        };
        if let Err(e) = ws.send(Message::Text(payload)).await {
            state_tx.send_replace(ConnectionState::Failed);
            return Err(TransportError::Send(e.to_string()));
        }
        state_tx.send_replace(ConnectionState::Open);
        debug!(chat_id, tools = tools.len(), "initiating frame sent");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = DuplexSession {
            chat_id,
            tools,
            events: event_tx,
            state: state_tx,
            cancel: cancel.clone(),
            pending: HashMap::new(),
        };
        let task = tokio::spawn(session.run(ws));
        Ok(Exchange {
            events: event_rx,
            state: state_rx,
            cancel,
            task,
        })
    }

    /// Open a unidirectional exchange. A non-success status fails before
    /// any frame is read.
    pub async fn open_stream(
        &self,
        chat_id: ChatId,
        request: &StreamRequest,
    ) -> Result<Exchange, TransportError> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let url = format!(
            "{}/chats/{}",
            self.config.base_url.trim_end_matches('/'),
            chat_id
        );
        info!(chat_id, url = %url, "opening completion stream");
        let resp = match self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                state_tx.send_replace(ConnectionState::Failed);
                return Err(TransportError::Connect(e.to_string()));
            }
        };
        if !resp.status().is_success() {
            state_tx.send_replace(ConnectionState::Failed);
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        state_tx.send_replace(ConnectionState::Open);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_stream(
            chat_id,
            resp,
            event_tx,
            state_tx,
            cancel.clone(),
        ));
        Ok(Exchange {
            events: event_rx,
            state: state_rx,
            cancel,
            task,
        })
    }
}

/// Inbound tool call awaiting its result frame.
struct PendingInvocation {
    name: String,
    started: Instant,
}

type Completion = (RequestId, Result<String, ToolError>);

/// Owns the socket and the pending invocation set for one duplex exchange.
struct DuplexSession {
    chat_id: ChatId,
    tools: Arc<ToolRegistry>,
    events: mpsc::UnboundedSender<StreamEvent>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    pending: HashMap<RequestId, PendingInvocation>,
}

impl DuplexSession {
    async fn run(mut self, ws: WsStream) -> Result<(), TransportError> {
        let (mut sink, mut stream) = ws.split();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut close: Option<(Option<u16>, String)> = None;
        let mut transport_error: Option<String> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(
                        chat_id = self.chat_id,
                        pending = self.pending.len(),
                        "exchange cancelled, closing channel"
                    );
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "cancelled".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    self.state.send_replace(ConnectionState::Closed);
                    return Err(TransportError::Cancelled);
                }
                Some((id, outcome)) = done_rx.recv() => {
                    if close.is_some() {
                        self.discard(&id);
                        continue;
                    }
                    if let Err(e) = self.complete(&mut sink, id, outcome).await {
                        transport_error = Some(e);
                        break;
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text, &done_tx),
                    Some(Ok(Message::Binary(bytes))) => {
                        warn!(len = bytes.len(), "dropping binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        self.state.send_replace(ConnectionState::Draining);
                        let (code, reason) = match frame {
                            Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                            None => (None, String::new()),
                        };
                        debug!(chat_id = self.chat_id, ?code, reason = %reason, "close frame received");
                        close = Some((code, reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => break,
                    Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake))) => {
                        break;
                    }
                    Some(Err(e)) if close.is_some() => {
                        debug!(chat_id = self.chat_id, error = %e, "error after close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(chat_id = self.chat_id, error = %e, "channel read failed");
                        transport_error = Some(e.to_string());
                        break;
                    }
                    None => break,
                },
            }
        }

        if !self.pending.is_empty() {
            warn!(
                chat_id = self.chat_id,
                pending = self.pending.len(),
                "channel ended with tool calls in flight, results will be discarded"
            );
        }
        let (code, reason) = match close {
            Some((code, reason)) => (code, reason),
            None => (Some(CLOSE_ABNORMAL), String::new()),
        };
        let outcome = close_outcome(code, &reason, transport_error.as_deref());
        match &outcome {
            Ok(()) => {
                self.state.send_replace(ConnectionState::Closed);
                info!(chat_id = self.chat_id, ?code, "exchange completed");
            }
            Err(e) => {
                self.state.send_replace(ConnectionState::Failed);
                warn!(chat_id = self.chat_id, error = %e, "exchange failed");
            }
        }
        outcome
    }

    fn handle_text(&mut self, text: &str, done: &mpsc::UnboundedSender<Completion>) {
        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        match frame {
            InboundFrame::Block(block) => {
                debug!(id = %block.id, kind = block.type_name(), "block frame");
                self.emit(StreamEvent::Block(block));
            }
            InboundFrame::ServerError(message) => {
                warn!(chat_id = self.chat_id, message = %message, "server reported error");
                self.emit(StreamEvent::ServerError(message));
            }
            InboundFrame::ToolCall(call) => self.dispatch(call, done),
        }
    }

    /// Start a tool call without blocking the read loop.
    fn dispatch(&mut self, call: ToolCallRequest, done: &mpsc::UnboundedSender<Completion>) {
        if self.pending.contains_key(&call.id) {
            warn!(id = %call.id, tool = %call.name, "duplicate tool call id, dropping");
            return;
        }
        info!(id = %call.id, tool = %call.name, "tool call received");
        self.pending.insert(
            call.id.clone(),
            PendingInvocation {
                name: call.name.clone(),
                started: Instant::now(),
            },
        );
        self.emit(StreamEvent::ToolStarted {
            id: call.id.clone(),
            name: call.name.clone(),
        });
        let tools = Arc::clone(&self.tools);
        let done = done.clone();
        tokio::spawn(async move {
            let outcome = tools.call(&call.name, &call.args).await;
            // Receiver is gone once the exchange ended; the result is dropped.
            let _ = done.send((call.id, outcome));
        });
    }

    /// Send the result frame for a finished call. Errors are socket errors.
    async fn complete<S>(
        &mut self,
        sink: &mut S,
        id: RequestId,
        outcome: Result<String, ToolError>,
    ) -> Result<(), String>
    where
        S: futures_util::Sink<Message, Error = WsError> + Unpin,
    {
        let Some(pending) = self.pending.remove(&id) else {
            warn!(id = %id, "completion for unknown invocation");
            return Ok(());
        };
        let error = outcome.as_ref().err().map(|e| e.to_string());
        match &error {
            Some(e) => warn!(id = %id, tool = %pending.name, error = %e, "tool call failed"),
            None => info!(
                id = %id,
                tool = %pending.name,
                elapsed_ms = pending.started.elapsed().as_millis() as u64,
                "tool call finished"
            ),
        }
        let response = ToolResponse::from_outcome(id.clone(), outcome);
        let json = serde_json::to_string(&response).map_err(|e| e.to_string())?;
        sink.send(Message::Text(json))
            .await
            .map_err(|e| e.to_string())?;
        self.emit(StreamEvent::ToolFinished {
            id,
            name: pending.name,
            error,
        });
        Ok(())
    }

    /// Drop the result of a call that finished after the peer closed.
    fn discard(&mut self, id: &RequestId) {
        if let Some(pending) = self.pending.remove(id) {
            debug!(
                chat_id = self.chat_id,
                id = %id,
                tool = %pending.name,
                "channel closing, discarding tool result"
            );
        }
    }

    fn emit(&self, event: StreamEvent) {
        if self.events.send(event).is_err() {
            debug!(chat_id = self.chat_id, "event receiver dropped");
        }
    }
}

async fn run_stream(
    chat_id: ChatId,
    resp: reqwest::Response,
    events: mpsc::UnboundedSender<StreamEvent>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    let mut body = resp.bytes_stream();
    let mut buffer = SseLineBuffer::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(chat_id, "stream cancelled");
                state.send_replace(ConnectionState::Closed);
                return Err(TransportError::Cancelled);
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    for data in buffer.push(&bytes) {
                        handle_stream_data(&data, &events);
                    }
                }
                Some(Err(e)) => {
                    warn!(chat_id, error = %e, "stream read failed");
                    state.send_replace(ConnectionState::Failed);
                    return Err(TransportError::Read(e.to_string()));
                }
                None => break,
            },
        }
    }
    state.send_replace(ConnectionState::Draining);
    if let Some(data) = buffer.finish() {
        handle_stream_data(&data, &events);
    }
    state.send_replace(ConnectionState::Closed);
    info!(chat_id, lines = buffer.lines_seen(), "stream completed");
    Ok(())
}

fn handle_stream_data(data: &str, events: &mpsc::UnboundedSender<StreamEvent>) {
    let event = match StreamMessage::decode(data) {
        Ok(StreamMessage::Frame(InboundFrame::Block(block))) => StreamEvent::Block(block),
        Ok(StreamMessage::Frame(InboundFrame::ServerError(message))) => {
            StreamEvent::ServerError(message)
        }
        Ok(StreamMessage::Frame(InboundFrame::ToolCall(call))) => {
            warn!(id = %call.id, tool = %call.name, "tool call on a one-way stream, dropping");
            return;
        }
        Ok(StreamMessage::Delta(delta)) => StreamEvent::Delta(delta),
        Err(e) => {
            warn!(error = %e, data = %data, "dropping malformed stream message");
            return;
        }
    };
    if events.send(event).is_err() {
        debug!("event receiver dropped");
    }
}
