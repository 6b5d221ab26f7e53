//! Configuration loading, validation, and management for scanpilot.
//!
//! Loads configuration from `~/.scanpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.scanpilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the reasoning backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for every decision
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP timeout for one decision request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Loop behaviour
    #[serde(default)]
    pub agent: AgentConfig,

    /// External scanner locations and settings
    #[serde(default)]
    pub scanners: ScannerConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_request_timeout() -> u64 {
    120
}

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
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("agent", &self.agent)
            .field("scanners", &self.scanners)
            .finish()
    }
}

/// What a capability fault does to its round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// The failing call's result carries an error payload; siblings complete
    #[default]
    Isolate,
    /// The first fault aborts the round and the session
    Abort,
}

/// What happens when the backend is still requesting tools at `max_rounds`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundLimitBehavior {
    /// Fail with a round-limit error
    #[default]
    Error,
    /// Return the latest non-empty assistant text (possibly empty)
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum decisions per analysis
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    #[serde(default)]
    pub fault_policy: FaultPolicy,

    #[serde(default)]
    pub on_round_limit: RoundLimitBehavior,
}

fn default_max_rounds() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            fault_policy: FaultPolicy::default(),
            on_round_limit: RoundLimitBehavior::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Root directory for per-target result files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Interpreter used for the Python-based scanners
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_sqlmap_api_path")]
    pub sqlmap_api_path: PathBuf,

    #[serde(default = "default_sqlmap_host")]
    pub sqlmap_host: String,

    #[serde(default = "default_sqlmap_port")]
    pub sqlmap_port: u16,

    /// How long to wait for the sqlmap API to answer after spawning it
    #[serde(default = "default_sqlmap_startup_timeout")]
    pub sqlmap_startup_timeout_secs: u64,

    /// Delay between scan status polls
    #[serde(default = "default_sqlmap_poll_interval")]
    pub sqlmap_poll_interval_secs: u64,

    #[serde(default = "default_sstimap_path")]
    pub sstimap_path: PathBuf,

    #[serde(default = "default_oneforall_path")]
    pub oneforall_path: PathBuf,

    /// Directory containing WebTree's `index.js`
    #[serde(default = "default_webtree_dir")]
    pub webtree_dir: PathBuf,

    #[serde(default = "default_webtree_timeout")]
    pub webtree_timeout_secs: u64,

    #[serde(default = "default_ffuf_wordlist")]
    pub ffuf_wordlist: PathBuf,

    #[serde(default = "default_nmap_binary")]
    pub nmap_binary: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("scan-output")
}
fn default_python() -> String {
    "python3".into()
}
fn default_sqlmap_api_path() -> PathBuf {
    PathBuf::from("tools/module_sqlmap/sqlmapapi.py")
}
fn default_sqlmap_host() -> String {
    "127.0.0.1".into()
}
fn default_sqlmap_port() -> u16 {
    8775
}
fn default_sqlmap_startup_timeout() -> u64 {
    30
}
fn default_sqlmap_poll_interval() -> u64 {
    5
}
fn default_sstimap_path() -> PathBuf {
    PathBuf::from("tools/module_sstimap/sstimap.py")
}
fn default_oneforall_path() -> PathBuf {
    PathBuf::from("tools/module_oneforall/oneforall.py")
}
fn default_webtree_dir() -> PathBuf {
    PathBuf::from("tools/module_WebTree")
}
fn default_webtree_timeout() -> u64 {
    300
}
fn default_ffuf_wordlist() -> PathBuf {
    PathBuf::from("/usr/share/dirb/wordlists/common.txt")
}
fn default_nmap_binary() -> String {
    "nmap".into()
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            python: default_python(),
            sqlmap_api_path: default_sqlmap_api_path(),
            sqlmap_host: default_sqlmap_host(),
            sqlmap_port: default_sqlmap_port(),
            sqlmap_startup_timeout_secs: default_sqlmap_startup_timeout(),
            sqlmap_poll_interval_secs: default_sqlmap_poll_interval(),
            sstimap_path: default_sstimap_path(),
            oneforall_path: default_oneforall_path(),
            webtree_dir: default_webtree_dir(),
            webtree_timeout_secs: default_webtree_timeout(),
            ffuf_wordlist: default_ffuf_wordlist(),
            nmap_binary: default_nmap_binary(),
        }
    }
}

impl ScannerConfig {
    /// Base URL of the sqlmap REST API.
    pub fn sqlmap_api_url(&self) -> String {
        format!("http://{}:{}", self.sqlmap_host, self.sqlmap_port)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.scanpilot/config.toml).
    ///
    /// Environment variables override the file:
    /// - `SCANPILOT_API_KEY`, then `OPENAI_API_KEY`
    /// - `SCANPILOT_BASE_URL`, then `OPENAI_BASE_URL`
    /// - `SCANPILOT_MODEL`, then `OPENAI_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load from `path`, then apply overrides looked up through `var`.
    pub fn load_with(path: &Path, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(var);
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

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().find_map(|k| var(k).filter(|v| !v.is_empty()));

        if let Some(key) = first(&["SCANPILOT_API_KEY", "OPENAI_API_KEY"]) {
            self.api_key = Some(key);
        }
        if let Some(url) = first(&["SCANPILOT_BASE_URL", "OPENAI_BASE_URL"]) {
            self.base_url = url;
        }
        if let Some(model) = first(&["SCANPILOT_MODEL", "OPENAI_MODEL"]) {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".scanpilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be at least 1".into(),
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("base_url must not be empty".into()));
        }

        if self.scanners.sqlmap_poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "scanners.sqlmap_poll_interval_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            agent: AgentConfig::default(),
            scanners: ScannerConfig::default(),
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
