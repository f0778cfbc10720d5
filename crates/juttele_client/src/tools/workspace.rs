//! Filesystem and git helpers shared by the file tools.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::ToolError;

/// Walk upward from `start` until a directory containing `.git` is found.
pub async fn find_git_root(start: &Path) -> Result<PathBuf, ToolError> {
    let not_a_repo = || ToolError::NotAGitRepository(start.to_path_buf());
    let start = tokio::fs::canonicalize(start)
        .await
        .map_err(|_| not_a_repo())?;
    for dir in start.ancestors() {
        if tokio::fs::try_exists(dir.join(".git")).await.unwrap_or(false) {
            debug!(root = %dir.display(), "found git root");
            return Ok(dir.to_path_buf());
        }
    }
    Err(not_a_repo())
}

/// Join a caller-supplied relative path onto `root`.
///
/// Absolute paths and `..` components are rejected.
pub fn resolve_relative(root: &Path, file_path: &str) -> Result<PathBuf, ToolError> {
    let rel = Path::new(file_path);
    if file_path.is_empty() || rel.is_absolute() {
        return Err(ToolError::PathOutsideRoot(file_path.to_string()));
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(ToolError::PathOutsideRoot(file_path.to_string())),
        }
    }
    Ok(root.join(rel))
}

/// Tracked plus untracked-but-not-ignored files, relative to `root`.
pub async fn list_non_ignored_files(root: &Path) -> Result<Vec<String>, ToolError> {
    let output = Command::new("git")
        .args(["ls-files", "--cached", "--others", "--exclude-standard"])
        .current_dir(root)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ToolError::Subprocess {
            command: "git ls-files",
            message: e.to_string(),
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(stderr = %stderr.trim(), "git ls-files failed");
        return Err(ToolError::Subprocess {
            command: "git ls-files",
            message: stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

pub async fn read_text(path: &Path, display: &str) -> Result<String, ToolError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolError::FileNotFound(display.to_string())
        } else {
            ToolError::Read {
                path: display.to_string(),
                source: e,
            }
        }
    })
}

pub async fn write_text(path: &Path, display: &str, content: &str) -> Result<(), ToolError> {
    let write_err = |source| ToolError::Write {
        path: display.to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    tokio::fs::write(path, content).await.map_err(write_err)
}
