//! Configuration for stream-chat
//!
//! Values are read from `<config dir>/stream-chat/config.toml`, then
//! `OPENAI_API_KEY`, `STREAM_CHAT_URL` and `STREAM_CHAT_MODEL` override the
//! file. The CLI applies `--config` and `--demo` on top.

use crate::api::{ExtractorKind, RequestSettings, DEMO_URL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint and credentials
    pub request: RequestConfig,

    /// Request body and response decoding
    pub completions: CompletionsSettings,

    /// Timing of the simulated stream
    pub simulation: SimulationSettings,
}

/// Endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Completions endpoint, or "demo" for the simulated stream
    pub url: String,

    /// HTTP method
    pub method: String,

    /// API key (can also use OPENAI_API_KEY env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/completions".to_string(),
            method: "POST".to_string(),
            api_key: None,
            headers: BTreeMap::new(),
        }
    }
}

/// Completions request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionsSettings {
    /// Model to request
    pub model: String,

    /// Longest prompt, in characters
    pub max_char_length: usize,

    /// Fixed completion budget; derived from the prompt length when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Stream the response instead of waiting for it
    pub stream: bool,

    /// How text is pulled out of responses (completions, chat)
    pub extractor: ExtractorKind,
}

impl Default for CompletionsSettings {
    fn default() -> Self {
        Self {
            model: "text-davinci-003".to_string(),
            max_char_length: crate::api::CONVERSE_MAX_CHAR_LENGTH,
            max_tokens: None,
            temperature: None,
            stream: true,
            extractor: ExtractorKind::Completions,
        }
    }
}

/// Simulated stream timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Delay before the simulated stream opens
    pub open_delay_ms: u64,

    /// Delay between simulated words
    pub interval_ms: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            open_delay_ms: 400,
            interval_ms: 70,
        }
    }
}

impl Config {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stream-chat")
            .join("config.toml")
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from specific path
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default().with_env_overrides());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.request.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("STREAM_CHAT_URL") {
            self.request.url = url;
        }
        if let Ok(model) = std::env::var("STREAM_CHAT_MODEL") {
            self.completions.model = model;
        }

        self
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("request.url".to_string()));
        }
        if self.request.url == DEMO_URL {
            return Ok(());
        }
        if reqwest::Method::from_bytes(self.request.method.to_uppercase().as_bytes()).is_err() {
            return Err(ConfigError::Invalid {
                field: "request.method",
                reason: format!("'{}' is not an HTTP method", self.request.method),
            });
        }
        if self.completions.max_char_length == 0 {
            return Err(ConfigError::Invalid {
                field: "completions.max_char_length",
                reason: "must be greater than zero".to_string(),
            });
        }

        let has_auth_header = self
            .request
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("authorization"));
        if self.request.api_key.is_none() && !has_auth_header {
            return Err(ConfigError::MissingRequired(
                "An API key is required (OPENAI_API_KEY or request.api_key)".to_string(),
            ));
        }

        Ok(())
    }

    /// Request settings with the credential applied. Explicit headers win over
    /// the ones derived from the key.
    pub fn request_settings(&self) -> RequestSettings {
        let mut settings = RequestSettings::new(self.request.url.clone());
        settings.method = self.request.method.clone();
        if let Some(key) = &self.request.api_key {
            settings = settings.with_key(key);
        }
        for (name, value) in &self.request.headers {
            settings = settings.with_header(name.clone(), value.clone());
        }
        settings
    }

    /// Generate example config content
    pub fn example() -> String {
        let example = Config::default();
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

/// Builder for creating Config programmatically
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.request.url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.request.api_key = Some(key.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.request.headers.insert(name.into(), value.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.completions.model = model.into();
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.config.completions.stream = stream;
        self
    }

    pub fn extractor(mut self, extractor: ExtractorKind) -> Self {
        self.config.completions.extractor = extractor;
        self
    }

    pub fn simulation(mut self, open_delay_ms: u64, interval_ms: u64) -> Self {
        self.config.simulation = SimulationSettings {
            open_delay_ms,
            interval_ms,
        };
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.request.method, "POST");
        assert_eq!(config.completions.model, "text-davinci-003");
        assert!(config.completions.stream);
        assert_eq!(config.simulation.open_delay_ms, 400);
        assert_eq!(config.simulation.interval_ms, 70);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .url("http://localhost:8080/v1/completions")
            .api_key("test-key")
            .model("gpt-3.5-turbo-instruct")
            .extractor(ExtractorKind::Chat)
            .stream(false)
            .build();

        assert_eq!(config.request.api_key, Some("test-key".to_string()));
        assert_eq!(config.completions.model, "gpt-3.5-turbo-instruct");
        assert_eq!(config.completions.extractor, ExtractorKind::Chat);
        assert!(!config.completions.stream);
    }

    #[test]
    fn test_request_settings_explicit_header_wins() {
        let config = ConfigBuilder::new()
            .api_key("from-key")
            .header("Authorization", "Token custom")
            .header("X-Org", "acme")
            .build();

        let settings = config.request_settings();
        assert_eq!(
            settings.headers.get("Authorization").map(String::as_str),
            Some("Token custom")
        );
        assert_eq!(settings.headers.get("X-Org").map(String::as_str), Some("acme"));
        assert_eq!(
            settings.headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_validate() {
        assert!(ConfigBuilder::new().url(DEMO_URL).build().validate().is_ok());
        assert!(ConfigBuilder::new().api_key("k").build().validate().is_ok());
        assert!(ConfigBuilder::new()
            .header("authorization", "Bearer x")
            .build()
            .validate()
            .is_ok());
        assert!(matches!(
            ConfigBuilder::new().build().validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_method() {
        let mut config = ConfigBuilder::new().api_key("k").build();
        config.request.method = "SEND IT".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "request.method", .. })
        ));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [request]
            url = "demo"

            [completions]
            extractor = "chat"

            [simulation]
            interval_ms = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.request.url, "demo");
        assert_eq!(config.request.method, "POST");
        assert_eq!(config.completions.extractor, ExtractorKind::Chat);
        assert_eq!(config.simulation.open_delay_ms, 400);
        assert_eq!(config.simulation.interval_ms, 10);
    }

    #[test]
    fn test_example_config() {
        let example = Config::example();
        assert!(example.contains("[request]"));
        assert!(example.contains("[completions]"));
        assert!(example.contains("[simulation]"));
    }
}
