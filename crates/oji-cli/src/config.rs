//! Configuration file support

use oji_chat::ChatConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when no key is configured
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for oji
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint root, e.g. http://localhost:9068/v1
    pub base_url: Option<String>,
    /// Default model id
    pub model: Option<String>,
    /// API key (alternative to OPENAI_API_KEY)
    pub api_key: Option<String>,
    /// Stream replies as they are generated
    pub stream: Option<bool>,
    pub system_prompt: Option<String>,
    pub max_completion_tokens: Option<u32>,
    /// Connection probe deadline in seconds
    pub probe_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oji")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("OJI_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let defaults = ChatConfig::default();
        let default_config = Config {
            base_url: Some(defaults.base_url),
            model: Some(defaults.model),
            api_key: None,
            stream: Some(defaults.stream),
            system_prompt: None,
            max_completion_tokens: Some(defaults.max_completion_tokens),
            probe_timeout_secs: Some(defaults.probe_timeout.as_secs()),
        };

        default_config.save()?;
        Ok(path)
    }

    /// Get the API key, checking config then env
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
    }

    /// Settings for the chat core; unset fields keep their defaults
    pub fn chat_config(&self) -> ChatConfig {
        let defaults = ChatConfig::default();
        ChatConfig {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            api_key: self.get_api_key(),
            stream: self.stream.unwrap_or(defaults.stream),
            system_prompt: self.system_prompt.clone().filter(|p| !p.trim().is_empty()),
            max_completion_tokens: self
                .max_completion_tokens
                .unwrap_or(defaults.max_completion_tokens),
            model: self.model.clone().unwrap_or(defaults.model),
            available_models: Vec::new(),
            probe_timeout: self
                .probe_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# oji configuration file
# Place at ~/.config/oji/config.toml (Linux), ~/Library/Application Support/oji/config.toml (Mac)
# or %APPDATA%\oji\config.toml (Windows). OJI_CONFIG_PATH overrides the location.

# OpenAI-compatible endpoint
base_url = "http://localhost:9068/v1"

# Default model
model = "gpt-3.5-turbo"

# Stream replies as they are generated
stream = true

# Upper bound on generated tokens per reply
max_completion_tokens = 8192

# Seconds before a connection test gives up
probe_timeout_secs = 30

# Optional system prompt sent before every conversation
# system_prompt = "You are a helpful assistant."

# API key (optional - OPENAI_API_KEY is used when unset)
# api_key = "sk-..."
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:9068/v1"));
        assert_eq!(config.model.as_deref(), Some("gpt-3.5-turbo"));
        assert_eq!(config.stream, Some(true));
        assert_eq!(config.max_completion_tokens, Some(8192));
        assert_eq!(config.probe_timeout_secs, Some(30));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            model = "llama3"
            stream = false
            probe_timeout_secs = 5
            "#,
        )
        .unwrap();
        let chat = config.chat_config();
        assert_eq!(chat.model, "llama3");
        assert!(!chat.stream);
        assert_eq!(chat.base_url, "http://localhost:9068/v1");
        assert_eq!(chat.max_completion_tokens, 8192);
        assert_eq!(chat.probe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_configured_key_wins() {
        let config = Config {
            api_key: Some("sk-config".into()),
            ..Config::default()
        };
        assert_eq!(config.get_api_key().as_deref(), Some("sk-config"));
    }

    #[test]
    fn test_blank_system_prompt_dropped() {
        let config = Config {
            system_prompt: Some("   ".into()),
            ..Config::default()
        };
        assert!(config.chat_config().system_prompt.is_none());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config {
            base_url: Some("http://example.test/v1".into()),
            max_completion_tokens: Some(1024),
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
