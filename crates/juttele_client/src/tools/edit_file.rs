use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use super::workspace::{find_git_root, read_text, resolve_relative, write_text};
use super::{parse_args, Tool, ToolError};

#[derive(Deserialize)]
struct Params {
    file_path: String,
    unique_string: String,
    num_lines: usize,
    content: String,
}

/// Replace `num_lines` lines starting at the single line containing `needle`.
///
/// The replaced range is clamped to the end of the file. `replacement` may
/// span any number of lines. Zero or several matching lines is an error.
pub fn apply_edit(
    original: &str,
    needle: &str,
    num_lines: usize,
    replacement: &str,
) -> Result<String, ToolError> {
    let lines: Vec<&str> = original.split('\n').collect();
    let matches: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains(needle))
        .map(|(i, _)| i)
        .collect();
    let start = match matches.as_slice() {
        [] => return Err(ToolError::NotFound),
        [only] => *only,
        many => return Err(ToolError::AmbiguousMatch(many.len())),
    };
    let end = start.saturating_add(num_lines).min(lines.len());

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..start]);
    out.extend(replacement.split('\n'));
    out.extend_from_slice(&lines[end..]);
    Ok(out.join("\n"))
}

pub struct EditFileTool {
    root: PathBuf,
}

impl EditFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit file contents by replacing a specific section. The tool finds the line containing \
         'unique_string' (it must appear within a single line, and on exactly one line), then \
         replaces 'num_lines' lines starting from that line with 'content', which may have any \
         number of lines. Example: if 'unique_string' is on line 10 and 'num_lines' is 3, lines \
         10-12 are replaced. All indentation in 'content' must be given explicitly. If this tool \
         keeps failing, fall back to 'write_file' and replace the whole file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The relative path to the file to edit."
                },
                "unique_string": {
                    "type": "string",
                    "description": "A unique string to identify the first line to edit."
                },
                "num_lines": {
                    "type": "integer",
                    "description": "The number of lines to replace with the new content."
                },
                "content": {
                    "type": "string",
                    "description": "The new content to write starting from the unique string's line."
                }
            },
            "required": ["file_path", "unique_string", "num_lines", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &str) -> Result<String, ToolError> {
        let params: Params = parse_args(args)?;
        find_git_root(&self.root).await?;
        let path = resolve_relative(&self.root, &params.file_path)?;
        let original = read_text(&path, &params.file_path).await?;
        let edited = apply_edit(
            &original,
            &params.unique_string,
            params.num_lines,
            &params.content,
        )?;
        write_text(&path, &params.file_path, &edited).await?;
        info!(file = %params.file_path, num_lines = params.num_lines, "edited file");
        Ok(json!({ "ok": true, "edited_content": edited }).to_string())
    }
}
