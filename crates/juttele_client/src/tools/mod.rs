//! Local tools the backend may invoke during a generation turn.
//!
//! Every tool takes its arguments as a JSON string and returns a serialized
//! result string. Failures are [`ToolError`]s, which the transport turns into
//! JSON-RPC error frames; they never tear down the connection.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::messages::ToolDescriptor;

mod edit_file;
mod grep;
mod list_files;
mod read_file;
pub mod workspace;
mod write_file;

pub use edit_file::{apply_edit, EditFileTool};
pub use grep::{summarize_matches, GrepSummary, GrepTool, MAX_GREP_RESULTS};
pub use list_files::ListFilesTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

/// Default bound on a single tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tool failure, reported back to the peer as `{code, message}`.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("tool {0:?} not found")]
    UnknownTool(String),
    #[error("{} is not inside a git repository; this tool only works on git-tracked files", .0.display())]
    NotAGitRepository(PathBuf),
    #[error("path {0:?} must be relative and stay inside the tool root")]
    PathOutsideRoot(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("error reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error writing {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unique string not found in file")]
    NotFound,
    #[error("unique string found on {0} lines, it must match exactly one")]
    AmbiguousMatch(usize),
    #[error("{command} failed: {message}")]
    Subprocess {
        command: &'static str,
        message: String,
    },
    #[error("tool {name:?} timed out after {}s", .timeout.as_secs())]
    Timeout { name: String, timeout: Duration },
}

impl ToolError {
    /// JSON-RPC style error code sent in the error frame.
    pub fn code(&self) -> i64 {
        match self {
            ToolError::InvalidArguments(_) => -32602,
            ToolError::UnknownTool(_) => -32601,
            ToolError::NotAGitRepository(_) => -32001,
            ToolError::PathOutsideRoot(_) => -32002,
            ToolError::FileNotFound(_) => -32003,
            ToolError::Read { .. } | ToolError::Write { .. } => -32004,
            ToolError::NotFound => -32005,
            ToolError::AmbiguousMatch(_) => -32006,
            ToolError::Subprocess { .. } => -32007,
            ToolError::Timeout { .. } => -32008,
        }
    }
}

/// Parse a JSON argument payload into the tool's parameter struct.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: &str) -> Result<T, ToolError> {
    serde_json::from_str(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// A locally executed capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the argument object.
    fn parameters_schema(&self) -> Value;

    /// `{name, description, parameters}` as advertised to the backend.
    fn spec(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": self.parameters_schema(),
        })
    }

    async fn execute(&self, args: &str) -> Result<String, ToolError>;
}

/// Ordered, read-only set of tools shared by concurrent invocations.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// The five file tools, all rooted at `root`.
    pub fn workspace(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let mut registry = Self::new();
        let tools: [Arc<dyn Tool>; 5] = [
            Arc::new(EditFileTool::new(root.clone())),
            Arc::new(GrepTool::new(root.clone())),
            Arc::new(ListFilesTool::new(root.clone())),
            Arc::new(ReadFileTool::new(root.clone())),
            Arc::new(WriteFileTool::new(root)),
        ];
        for tool in tools {
            // Names above are distinct.
            let _ = registry.register(tool);
        }
        registry
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a tool; a second tool with the same name is rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), String> {
        if self.get(tool.name()).is_some() {
            return Err(format!("tool {:?} already registered", tool.name()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The `tools` array of the initiating request, in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                spec: t.spec(),
            })
            .collect()
    }

    /// Run `name` with `args` under the registry timeout.
    ///
    /// An unknown name fails immediately without touching any executor.
    pub async fn call(&self, name: &str, args: &str) -> Result<String, ToolError> {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "tool call for unregistered tool");
            return Err(ToolError::UnknownTool(name.to_string()));
        };
        debug!(tool = name, args_len = args.len(), "executing tool");
        match tokio::time::timeout(self.timeout, tool.execute(args)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    tool = name,
                    timeout_secs = self.timeout.as_secs(),
                    "tool execution timed out"
                );
                Err(ToolError::Timeout {
                    name: name.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}
