use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MeshchatError, Result};

/// Environment variable that overrides `model.api_key`.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Top-level meshchat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Outbound connection to the scene tool.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Scene tool listener (`serve-tool`).
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Language model used for translation.
    #[serde(default)]
    pub model: ModelConfig,

    /// Where model files live.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Settings {
    /// Load settings from a YAML file. Returns default if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| MeshchatError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load `~/.config/meshchat/config.yml`.
    pub fn load_global() -> Result<Self> {
        Self::load_from(&super::dirs_global().join("config.yml"))
    }

    /// Apply environment overrides on top of file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.model.api_key = Some(key);
            }
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Default: 10.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Default: 30.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    /// Upper bound on one response line. Default: 8192.
    #[serde(default = "default_read_buffer")]
    pub read_buffer_bytes: usize,
}

fn default_relay_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    9876
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_response_timeout() -> u64 {
    30
}
fn default_read_buffer() -> usize {
    8192
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            response_timeout_secs: default_response_timeout(),
            read_buffer_bytes: default_read_buffer(),
        }
    }
}

impl RelayConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_listener_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Requests that may wait for the executor. Default: 64.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Longest accepted request line. Default: 1 MiB.
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_listener_host() -> String {
    "127.0.0.1".into()
}
fn default_queue_capacity() -> usize {
    64
}
fn default_max_line_bytes() -> usize {
    1024 * 1024
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_listener_host(),
            port: default_port(),
            queue_capacity: default_queue_capacity(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

impl ListenerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    Anthropic,
    /// Keyword fallback only, no network.
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_api_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_model_timeout() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            api_base_url: default_api_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout(),
            api_key: None,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `<task_id>.glb` and `<task_id>_edited.glb`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// URL prefix under which `output_dir` is served.
    #[serde(default = "default_static_prefix")]
    pub static_prefix: String,
    #[serde(default = "default_export_format")]
    pub export_format: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("static").join("models")
}
fn default_static_prefix() -> String {
    "/static/models".into()
}
fn default_export_format() -> String {
    "GLB".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            static_prefix: default_static_prefix(),
            export_format: default_export_format(),
        }
    }
}
