use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

use super::workspace::{find_git_root, list_non_ignored_files};
use super::{Tool, ToolError};

pub struct ListFilesTool {
    root: PathBuf,
}

impl ListFilesTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "Lists all files in the current directory. Only to be used when the user explicitly asks to."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _args: &str) -> Result<String, ToolError> {
        find_git_root(&self.root).await?;
        let files = list_non_ignored_files(&self.root).await?;
        if files.is_empty() {
            return Ok("No git-tracked files found.".to_string());
        }
        Ok(json!(files).to_string())
    }
}
