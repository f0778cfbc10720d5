//! juttele: ask one question in a chat and stream the reply.
//! Assistant text goes to stdout; thinking, tool activity and errors go to
//! stderr. Tool calls run against the configured workspace.

use clap::Parser;
use juttele_client::api::ApiClient;
use juttele_client::block::{BlockKind, Chat, ChatId, Role};
use juttele_client::config::{self, Config, ConfigError};
use juttele_client::messages::{LegacyDelta, SendRequest, StreamRequest};
use juttele_client::{ChatStore, Client, StreamEvent, ToolRegistry, TransportError};
use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "juttele", version, about = "Stream a chat reply from the juttele backend")]
struct Args {
    /// Config file (default: $JUTTELE_CONFIG or ~/.juttele/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Existing chat to continue; a new chat is created when omitted
    #[arg(long)]
    chat: Option<ChatId>,

    /// Do not advertise local tools
    #[arg(long)]
    no_tools: bool,

    /// Use the one-way stream instead of the duplex channel
    #[arg(long)]
    sse: bool,

    /// Question to ask; read from stdin when omitted
    question: Option<String>,
}

fn resolve_config_path(flag: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(path);
    }
    if let Ok(val) = std::env::var("JUTTELE_CONFIG") {
        return Some(PathBuf::from(val));
    }
    config::default_config_path()
}

fn read_question(arg: Option<String>) -> String {
    if let Some(q) = arg {
        return q.trim().to_string();
    }
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).unwrap_or(0);
    line.trim().to_string()
}

fn chat_title(question: &str) -> String {
    const MAX: usize = 40;
    match question.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &question[..idx]),
        None => question.to_string(),
    }
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", msg);
    process::exit(1);
}

fn build_request(cfg: &Config, question: &str, tools: &ToolRegistry) -> Result<SendRequest, ConfigError> {
    let model_id = cfg
        .generation
        .model_id
        .clone()
        .ok_or(ConfigError::Missing("generation.model_id"))?;
    let personality_id = cfg
        .generation
        .personality_id
        .clone()
        .ok_or(ConfigError::Missing("generation.personality_id"))?;
    Ok(SendRequest {
        model_id,
        personality_id,
        content: question.to_string(),
        tools: tools.descriptors(),
        use_tools: !tools.is_empty(),
    })
}

fn build_tools(cfg: &Config, enabled: bool) -> ToolRegistry {
    if !enabled || !cfg.generation.use_tools {
        return ToolRegistry::new();
    }
    let root = cfg
        .tools
        .resolved_root()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    ToolRegistry::workspace(root).with_timeout(cfg.tools.timeout())
}

/// Writes assistant text incrementally as blocks are replaced.
#[derive(Default)]
struct ReplyPrinter {
    printed: HashMap<String, String>,
    thinking_seen: HashSet<String>,
    wrote_text: bool,
    server_error: bool,
}

impl ReplyPrinter {
    fn observe(&mut self, event: &StreamEvent) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        match event {
            StreamEvent::Block(block) => match &block.kind {
                BlockKind::Text {
                    role: Role::Assistant,
                    content,
                } => {
                    let previous = self.printed.entry(block.id.clone()).or_default();
                    if let Some(suffix) = content.strip_prefix(previous.as_str()) {
                        let _ = write!(out, "{}", suffix);
                    } else {
                        let _ = write!(out, "\n{}", content);
                    }
                    *previous = content.clone();
                    self.wrote_text = true;
                }
                BlockKind::Thinking { .. } => {
                    if self.thinking_seen.insert(block.id.clone()) {
                        eprintln!("[thinking]");
                    }
                }
                BlockKind::Tool {
                    name,
                    error: Some(err),
                    ..
                } => eprintln!("[tool {}] error: {}", name, err.message),
                BlockKind::Error { error } => eprintln!("Server error: {}", error.message),
                _ => {}
            },
            StreamEvent::Delta(LegacyDelta::Content(text)) => {
                let _ = write!(out, "{}", text);
                self.wrote_text = true;
            }
            StreamEvent::Delta(LegacyDelta::Thinking(text)) => eprint!("{}", text),
            StreamEvent::Delta(LegacyDelta::Error(msg)) | StreamEvent::ServerError(msg) => {
                eprintln!("Server error: {}", msg);
                self.server_error = true;
            }
            StreamEvent::ToolStarted { name, .. } => eprintln!("[tool {}] running", name),
            StreamEvent::ToolFinished {
                name,
                error: Some(err),
                ..
            } => eprintln!("[tool {}] failed: {}", name, err),
            StreamEvent::ToolFinished { name, .. } => eprintln!("[tool {}] done", name),
        }
        let _ = out.flush();
    }
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let config_path = resolve_config_path(args.config.clone())
        .unwrap_or_else(|| fail("unable to determine config path (set --config or JUTTELE_CONFIG)"));
    let cfg = config::load(&config_path).unwrap_or_else(|e| {
        fail(format!(
            "failed to load config from {}: {}",
            config_path.display(),
            e
        ))
    });
    let client_config = cfg.client_config().unwrap_or_else(|e| fail(e));

    let question = read_question(args.question.clone());
    if question.is_empty() {
        fail("no question provided");
    }

    let tools = build_tools(&cfg, !args.no_tools);
    let request = build_request(&cfg, &question, &tools).unwrap_or_else(|e| fail(e));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(format!("failed to create runtime: {}", e)));

    let outcome = rt.block_on(async {
        let api = ApiClient::new(client_config.clone());
        let chat_id = match args.chat {
            Some(id) => id,
            None => api
                .create_chat(&chat_title(&question))
                .await
                .unwrap_or_else(|e| fail(format!("failed to create chat: {}", e))),
        };

        let client = Client::new(client_config);
        let mut store = ChatStore::new();
        store.insert_chat(Chat::new(chat_id, chat_title(&question)));
        store.push_user_message(chat_id, &question);

        let opened = if args.sse {
            client.open_stream(chat_id, &StreamRequest::from(&request)).await
        } else {
            client.open(chat_id, &request, Arc::new(tools)).await
        };
        let exchange = opened.unwrap_or_else(|e| fail(e));

        let token = exchange.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        let mut printer = ReplyPrinter::default();
        let outcome = store
            .drive(chat_id, exchange, |event, _| printer.observe(event))
            .await;
        (outcome, printer)
    });

    let (result, printer) = outcome;
    if printer.wrote_text {
        println!();
    }
    match result {
        Ok(()) if printer.server_error => process::exit(1),
        Ok(()) => {}
        Err(TransportError::Cancelled) => {
            eprintln!("Cancelled");
            process::exit(130);
        }
        Err(e) => fail(e),
    }
}
