use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use super::workspace::{find_git_root, resolve_relative, write_text};
use super::{parse_args, Tool, ToolError};

#[derive(Deserialize)]
struct Params {
    file_path: String,
    content: String,
}

pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write to a file in the current directory. If the file does not exist, it will be created. \
         Only to be used when the user explicitly asks to."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The relative path to the file to write."
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file."
                }
            },
            "required": ["file_path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &str) -> Result<String, ToolError> {
        let params: Params = parse_args(args)?;
        find_git_root(&self.root).await?;
        let path = resolve_relative(&self.root, &params.file_path)?;
        write_text(&path, &params.file_path, &params.content).await?;
        info!(file = %params.file_path, bytes = params.content.len(), "wrote file");
        Ok(json!({ "ok": true }).to_string())
    }
}
