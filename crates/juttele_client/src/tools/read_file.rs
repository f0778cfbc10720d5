use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::workspace::{find_git_root, read_text, resolve_relative};
use super::{parse_args, Tool, ToolError};

#[derive(Deserialize)]
struct Params {
    file_path: String,
}

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a file in the current directory. Only to be used when the user explicitly asks to."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The relative path to the file to read."
                }
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &str) -> Result<String, ToolError> {
        let params: Params = parse_args(args)?;
        find_git_root(&self.root).await?;
        let path = resolve_relative(&self.root, &params.file_path)?;
        let content = read_text(&path, &params.file_path).await?;
        Ok(json!({ "content": content }).to_string())
    }
}
