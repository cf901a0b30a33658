//! Configuration management for Lectern

use crate::llm::{GenerationConfig, LlmProviderFactory, ProviderSettings};
use crate::planning::{PipelineConfig, DEFAULT_AUDIENCE};
use crate::utils::errors::{ConfigError, LecternError};
use crate::utils::http::RetryConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider used for generation
    pub active_provider: String,
    /// Model passed to the active provider
    pub active_model: String,
    /// Provider configurations
    pub providers: HashMap<String, ProviderConfig>,
    pub pipeline: PipelineSettings,
    pub retry: RetrySettings,
    pub generation: GenerationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Configuration for an LLM provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key; the `<PROVIDER>_API_KEY` environment variable wins over this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Provider-specific settings (`timeout_seconds` is understood by all)
    pub settings: HashMap<String, serde_json::Value>,
}

/// Generation pipeline limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_validation_retries: usize,
    pub max_concurrent_segments: usize,
    pub request_timeout_seconds: u64,
    pub default_audience: String,
}

/// Backoff around individual model calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_backoff: bool,
}

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active_provider: "ollama".to_string(),
            active_model: "gemma3:4b".to_string(),
            providers: HashMap::new(),
            pipeline: PipelineSettings::default(),
            retry: RetrySettings::default(),
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_validation_retries: 3,
            max_concurrent_segments: 4,
            request_timeout_seconds: 300, // 5 minutes
            default_audience: DEFAULT_AUDIENCE.to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            exponential_backoff: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            exponential_backoff: self.exponential_backoff,
        }
    }
}

impl ServerConfig {
    /// `bind:port` for the listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Configuration manager for loading, saving, and creating the config file
pub struct ConfigManager {
    config: Config,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file at an explicit path is an error.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(path) => (path, true),
            None => (Self::default_config_path()?, false),
        };

        let config = if config_path.exists() {
            Self::load_config(&config_path)?
        } else if explicit {
            return Err(ConfigError::FileNotFound { path: config_path }.into());
        } else {
            Config::default()
        };

        Ok(Self { config, config_path })
    }

    /// Write a default configuration file, refusing to overwrite unless `force`
    pub fn init(path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
        let config_path = match path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

        if config_path.exists() && !force {
            return Err(LecternError::validation(
                "config",
                format!(
                    "{} already exists; pass --force to overwrite",
                    config_path.display()
                ),
            ));
        }

        Self::save_config(&config_path, &Config::default())?;
        Ok(config_path)
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        Self::save_config(&self.config_path, &self.config)
    }

    /// `<config_dir>/lectern/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::FileNotFound {
            path: PathBuf::from("config directory"),
        })?;
        Ok(config_dir.join("lectern").join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError { source: e })?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError { source: e })
            .map_err(Into::into)
    }

    fn save_config(path: &Path, config: &Config) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
            }
        }

        let content =
            toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

impl Config {
    /// Get the active provider configuration
    pub fn active_provider_config(&self) -> Option<&ProviderConfig> {
        self.providers.get(&self.active_provider)
    }

    /// API key for the active provider, environment first
    pub fn active_api_key(&self) -> Option<String> {
        ApiKeyResolver::resolve_api_key(
            &self.active_provider,
            self.active_provider_config().and_then(|p| p.api_key.as_deref()),
        )
    }

    /// Check the configuration is usable for generation
    pub fn validate(&self) -> Result<()> {
        if self.active_provider.trim().is_empty() {
            return Err(LecternError::not_found("No active provider configured"));
        }

        let provider = self.active_provider.to_lowercase();
        if !LlmProviderFactory::list_providers().iter().any(|known| *known == provider) {
            return Err(ConfigError::InvalidValue {
                key: "active_provider".to_string(),
                value: self.active_provider.clone(),
            }
            .into());
        }

        if self.active_model.trim().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "active_model".to_string(),
            }
            .into());
        }

        for (name, provider_config) in &self.providers {
            if let Some(base_url) = &provider_config.base_url {
                url::Url::parse(base_url).map_err(|_| ConfigError::InvalidValue {
                    key: format!("providers.{}.base_url", name),
                    value: base_url.clone(),
                })?;
            }
        }

        if self.pipeline.max_concurrent_segments == 0 {
            return Err(LecternError::validation(
                "pipeline.max_concurrent_segments",
                "must be at least 1",
            ));
        }

        if self.pipeline.request_timeout_seconds == 0 {
            return Err(LecternError::validation(
                "pipeline.request_timeout_seconds",
                "must be at least 1",
            ));
        }

        if let Some(temperature) = self.generation.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidValue {
                    key: "generation.temperature".to_string(),
                    value: temperature.to_string(),
                }
                .into());
            }
        }

        if LlmProviderFactory::requires_api_key(&provider) && self.active_api_key().is_none() {
            return Err(LecternError::validation(
                "provider.api_key",
                format!(
                    "No API key found for provider '{}'. Set {} environment variable or configure api_key in config.",
                    self.active_provider,
                    ApiKeyResolver::env_key_name(&self.active_provider)
                ),
            ));
        }

        Ok(())
    }

    /// Settings for building the active provider
    pub fn provider_settings(&self) -> ProviderSettings {
        let mut settings = ProviderSettings::new(self.active_provider.to_lowercase(), self.active_model.clone());
        settings.api_key = self.active_api_key();
        settings.generation = self.generation.clone();

        if let Some(provider_config) = self.active_provider_config() {
            settings.base_url = provider_config.base_url.clone();
            if let Some(timeout) = provider_config
                .settings
                .get("timeout_seconds")
                .and_then(serde_json::Value::as_u64)
            {
                settings.timeout_seconds = timeout;
            }
        }

        settings
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_validation_retries: self.pipeline.max_validation_retries,
            max_concurrent_segments: self.pipeline.max_concurrent_segments,
            request_timeout: Some(Duration::from_secs(self.pipeline.request_timeout_seconds)),
            retry: self.retry.to_retry_config(),
        }
    }
}

/// Centralized API key resolution logic
pub struct ApiKeyResolver;

impl ApiKeyResolver {
    /// Get API key for provider with environment variable precedence
    pub fn resolve_api_key(provider_name: &str, config_api_key: Option<&str>) -> Option<String> {
        if let Ok(api_key) = std::env::var(Self::env_key_name(provider_name)) {
            if !api_key.trim().is_empty() {
                return Some(api_key);
            }
        }

        config_api_key
            .filter(|key| !key.trim().is_empty())
            .map(|s| s.to_string())
    }

    /// Get environment variable name for provider
    pub fn env_key_name(provider_name: &str) -> String {
        format!("{}_API_KEY", provider_name.to_uppercase())
    }
}
