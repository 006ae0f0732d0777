//! Configuration loading, validation, and management for chatloom.
//!
//! Loads configuration from `~/.chatloom/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chatloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key sent as a bearer token (optional for local servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier; when empty, `auto_model` picks one from the server
    #[serde(default = "default_model")]
    pub model: String,

    /// When `model` is empty, pick the first model the server lists
    #[serde(default = "default_true")]
    pub auto_model: bool,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Exchange behaviour
    #[serde(default)]
    pub chat: ChatConfig,

    /// Redraw behaviour
    #[serde(default)]
    pub render: RenderConfig,
}

fn default_endpoint() -> String {
    "http://localhost:8080/v1".into()
}
fn default_model() -> String {
    String::new()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("auto_model", &self.auto_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("chat", &self.chat)
            .field("render", &self.render)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Upper bound on request/stream rounds per exchange
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    /// Rolling window of persisted conversation turns
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Place reasoning text into the rendered document
    #[serde(default = "default_true")]
    pub include_reasoning: bool,

    /// Optional system prompt prepended to every request (never persisted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_tool_rounds() -> u32 {
    4
}
fn default_max_messages() -> usize {
    20
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            max_messages: default_max_messages(),
            include_reasoning: true,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Delay between the first redraw request of a burst and the redraw
    #[serde(default = "default_redraw_delay")]
    pub redraw_delay_ms: u64,

    /// Distance from the bottom within which auto-scroll keeps following
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold_px: u32,
}

fn default_redraw_delay() -> u64 {
    60
}
fn default_scroll_threshold() -> u32 {
    180
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            redraw_delay_ms: default_redraw_delay(),
            scroll_threshold_px: default_scroll_threshold(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.chatloom/config.toml).
    ///
    /// Environment overrides:
    /// - `CHATLOOM_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `CHATLOOM_ENDPOINT`
    /// - `CHATLOOM_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("CHATLOOM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(endpoint) = std::env::var("CHATLOOM_ENDPOINT") {
            config.endpoint = endpoint;
        }

        if let Ok(model) = std::env::var("CHATLOOM_MODEL") {
            config.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatloom")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError("endpoint must not be empty".into()));
        }

        if self.chat.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_tool_rounds must be at least 1".into(),
            ));
        }

        if self.chat.max_messages < 2 {
            return Err(ConfigError::ValidationError(
                "chat.max_messages must be at least 2".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            model: default_model(),
            auto_model: true,
            request_timeout_secs: default_request_timeout(),
            chat: ChatConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.endpoint, "http://localhost:8080/v1");
        assert_eq!(config.chat.max_tool_rounds, 4);
        assert_eq!(config.chat.max_messages, 20);
        assert_eq!(config.render.redraw_delay_ms, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.endpoint, config.endpoint);
        assert_eq!(parsed.render.scroll_threshold_px, 180);
    }

    #[test]
    fn zero_rounds_rejected() {
        let mut config = AppConfig::default();
        config.chat.max_tool_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_window_rejected() {
        let mut config = AppConfig::default();
        config.chat.max_messages = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(config.model.is_empty());
        assert!(config.auto_model);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "model = \"qwen\"\n[chat]\nmax_tool_rounds = 2\n[render]\nredraw_delay_ms = 30"
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model, "qwen");
        assert_eq!(config.chat.max_tool_rounds, 2);
        assert_eq!(config.chat.max_messages, 20);
        assert_eq!(config.render.redraw_delay_ms, 30);
        assert_eq!(config.render.scroll_threshold_px, 180);
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = [").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("sk-secret"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("localhost:8080"));
        assert!(toml_str.contains("max_tool_rounds"));
    }
}
