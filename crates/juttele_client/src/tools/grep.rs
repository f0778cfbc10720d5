//! Content search via ripgrep, limited to tracked and non-ignored files.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::workspace::{find_git_root, list_non_ignored_files};
use super::{parse_args, Tool, ToolError};

pub const MAX_GREP_RESULTS: usize = 100;

#[derive(Deserialize)]
struct Params {
    pattern: String,
    #[serde(default)]
    include: Option<String>,
}

/// Serialized result of a grep call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepSummary {
    pub num_files: usize,
    pub file_names: Vec<String>,
    pub truncated: bool,
    pub message: String,
}

/// Turn `rg -l` output into a summary, keeping only files in `tracked`.
pub fn summarize_matches(stdout: &str, tracked: &HashSet<String>) -> GrepSummary {
    let matches: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix("./").unwrap_or(line).to_string())
        .filter(|file| tracked.contains(file))
        .collect();
    let num_files = matches.len();
    let truncated = num_files > MAX_GREP_RESULTS;
    let message = if truncated {
        format!(
            "Found {} files (showing first {})",
            num_files, MAX_GREP_RESULTS
        )
    } else {
        format!(
            "Found {} file{}",
            num_files,
            if num_files == 1 { "" } else { "s" }
        )
    };
    GrepSummary {
        num_files,
        file_names: matches.into_iter().take(MAX_GREP_RESULTS).collect(),
        truncated,
        message,
    }
}

pub struct GrepTool {
    root: PathBuf,
}

impl GrepTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "- Fast content search tool that works with any codebase size\n\
         - Searches file contents using regular expressions (case-insensitive)\n\
         - Supports full regex syntax (eg. \"log.*Error\", \"function\\s+\\w+\")\n\
         - Filter files by pattern with the include parameter (eg. \"*.js\", \"*.{ts,tsx}\")\n\
         - Returns matching file paths"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The regular expression pattern to search for in file contents."
                },
                "include": {
                    "type": "string",
                    "description": "File pattern to include in the search (e.g. \"*.js\", \"*.{ts,tsx}\")"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &str) -> Result<String, ToolError> {
        let params: Params = parse_args(args)?;
        find_git_root(&self.root).await?;

        let mut cmd = Command::new("rg");
        // -l: file names only, -i: case insensitive
        cmd.arg("-li");
        if let Some(include) = &params.include {
            cmd.arg("--glob").arg(include);
        }
        cmd.arg("--")
            .arg(&params.pattern)
            .arg(".")
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| ToolError::Subprocess {
            command: "rg",
            message: e.to_string(),
        })?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Exit status 1 means no matches.
        if !output.status.success() && !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "ripgrep failed");
            return Err(ToolError::Subprocess {
                command: "rg",
                message: stderr.trim().to_string(),
            });
        }

        let tracked: HashSet<String> = list_non_ignored_files(&self.root)
            .await?
            .into_iter()
            .collect();
        let summary = summarize_matches(&String::from_utf8_lossy(&output.stdout), &tracked);
        debug!(num_files = summary.num_files, truncated = summary.truncated, "grep done");
        Ok(json!(summary).to_string())
    }
}
