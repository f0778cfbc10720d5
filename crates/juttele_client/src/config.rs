//! Client config load/save for `~/.juttele/config.yaml`.
//! Sections: api.*, generation.*, tools.*.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tools::DEFAULT_TOOL_TIMEOUT;

/// API section (base_url, api_key).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Generation section (model_id, personality_id, use_tools).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GenerationSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality_id: Option<String>,
    #[serde(default = "default_use_tools")]
    pub use_tools: bool,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            model_id: None,
            personality_id: None,
            use_tools: default_use_tools(),
        }
    }
}

fn default_use_tools() -> bool {
    true
}

/// Tools section (root, timeout_secs).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ToolsSection {
    /// Directory the local tools operate under. Relative paths are taken
    /// from the home directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ToolsSection {
    pub fn resolved_root(&self) -> Option<PathBuf> {
        let root = PathBuf::from(self.root.as_deref()?);
        if root.is_absolute() {
            return Some(root);
        }
        Some(dirs::home_dir()?.join(root))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOOL_TIMEOUT)
    }
}

/// Full config file.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// Connection settings handed to [`crate::Client`] and [`crate::ApiClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// http(s) origin of the backend, without trailing slash.
    pub base_url: String,
    /// Bearer credential attached to every request.
    pub api_key: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

impl Config {
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let base_url = self
            .api
            .base_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("api.base_url"))?;
        Ok(ClientConfig::new(
            base_url,
            self.api.api_key.clone().unwrap_or_default(),
        ))
    }
}

/// Returns the default config file path: `~/.juttele/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".juttele").join("config.yaml"))
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("missing config value: {0}")]
    Missing(&'static str),
}
