//! Configuration loading, validation, and management for Settlr.
//!
//! Loads configuration from `~/.settlr/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use settlr_core::GeoEnvelope;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.settlr/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model that drives the conversation
    #[serde(default = "default_model")]
    pub model: String,

    /// Smaller model used inside tools for polygon and POI generation
    #[serde(default = "default_tool_model")]
    pub tool_model: String,

    /// Temperature for the conversation model
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per conversation model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_tool_model() -> String {
    "claude-3-5-haiku-20241022".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
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
            .field("model", &self.model)
            .field("tool_model", &self.tool_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("provider", &self.provider)
            .field("database", &self.database)
            .field("gateway", &self.gateway)
            .field("discovery", &self.discovery)
            .finish()
    }
}

/// Agent loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool rounds allowed per turn before a forced final answer
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Wall-clock budget for one model call, stream included
    #[serde(default = "default_round_timeout_secs")]
    pub round_timeout_secs: u64,

    /// Replace the built-in system prompt with the contents of this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<PathBuf>,
}

fn default_max_rounds() -> u32 {
    8
}
fn default_round_timeout_secs() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            round_timeout_secs: default_round_timeout_secs(),
            system_prompt_path: None,
        }
    }
}

/// Anthropic endpoint and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Retries after the first attempt, for transient failures only
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL or path; `:memory:` keeps everything in process
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://settlr.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Browser origins allowed to call the API
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Settings for area resolution and point-of-interest discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_max_pois")]
    pub max_pois_per_interest: usize,

    /// Max tokens for the secondary polygon / POI model calls
    #[serde(default = "default_tool_max_tokens")]
    pub tool_max_tokens: u32,

    /// Generated polygons must fall inside this box
    #[serde(default)]
    pub envelope: GeoEnvelope,
}

fn default_max_pois() -> usize {
    20
}
fn default_tool_max_tokens() -> u32 {
    5000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_pois_per_interest: default_max_pois(),
            tool_max_tokens: default_tool_max_tokens(),
            envelope: GeoEnvelope::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.settlr/config.toml).
    ///
    /// Environment overrides:
    /// - `SETTLR_API_KEY`, then `ANTHROPIC_API_KEY`
    /// - `SETTLR_MODEL`
    /// - `SETTLR_DATABASE_URL`
    /// - `SETTLR_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_overrides(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
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

    /// Apply overrides from an environment lookup.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(key) = lookup("SETTLR_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("SETTLR_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("SETTLR_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(port) = lookup("SETTLR_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("SETTLR_PORT is not a valid port: {port}"))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".settlr")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 1.0".into(),
            ));
        }

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be at least 1".into(),
            ));
        }

        if self.agent.round_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.round_timeout_secs must be at least 1".into(),
            ));
        }

        if self.discovery.max_pois_per_interest == 0 {
            return Err(ConfigError::ValidationError(
                "discovery.max_pois_per_interest must be at least 1".into(),
            ));
        }

        if !self.discovery.envelope.is_well_formed() {
            return Err(ConfigError::ValidationError(
                "discovery.envelope minimums must be below maximums".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
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
            model: default_model(),
            tool_model: default_tool_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            provider: ProviderConfig::default(),
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            discovery: DiscoveryConfig::default(),
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
