//! Configuration loading, validation, and management for cardwire.
//!
//! Loads configuration from `~/.cardwire/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.cardwire/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// App credentials used to obtain access tokens
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Card API endpoints
    #[serde(default)]
    pub api: ApiConfig,

    /// Retry policy for card API calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-instance state retention
    #[serde(default)]
    pub store: StoreConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Form synchronization settings
    #[serde(default)]
    pub forms: FormsConfig,

    /// Proactive notice settings
    #[serde(default)]
    pub notice: NoticeConfig,

    /// Log output settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// AppKey / client id; also the robot code for group delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// AppSecret / client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the v1.0 card and oauth2 APIs
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the legacy `topapi` endpoints
    #[serde(default = "default_oapi_url")]
    pub oapi_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.dingtalk.com".into()
}
fn default_oapi_url() -> String {
    "https://oapi.dingtalk.com".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            oapi_url: default_oapi_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long per-instance state is kept after its last write
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// How often expired entries are swept
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Upper bound for `store.ttl_secs`: one year.
pub const MAX_STORE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    7001
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormsConfig {
    /// Language of user-facing form messages: "zh_CN" or "en"
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "zh_CN".into()
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoticeConfig {
    /// Staff id that receives proactive notice cards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable logs
    #[serde(default)]
    pub json: bool,
}

const SUPPORTED_LOCALES: &[&str] = &["zh_CN", "en"];

impl AppConfig {
    /// Load configuration from the default path (~/.cardwire/config.toml).
    ///
    /// Environment variables override the file:
    /// - `DINGTALK_APP_CLIENT_ID`
    /// - `DINGTALK_APP_CLIENT_SECRET`
    /// - `CARDWIRE_NOTICE_USER_ID`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("DINGTALK_APP_CLIENT_ID") {
            self.credentials.client_id = Some(id);
        }
        if let Some(secret) = lookup("DINGTALK_APP_CLIENT_SECRET") {
            self.credentials.client_secret = Some(secret);
        }
        if let Some(user) = lookup("CARDWIRE_NOTICE_USER_ID") {
            self.notice.user_id = Some(user);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cardwire")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.store.ttl_secs == 0 || self.store.ttl_secs > MAX_STORE_TTL_SECS {
            return Err(ConfigError::ValidationError(format!(
                "store.ttl_secs must be between 1 and {MAX_STORE_TTL_SECS}, got {}",
                self.store.ttl_secs
            )));
        }

        if self.store.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "store.sweep_interval_secs must be > 0".into(),
            ));
        }

        if !SUPPORTED_LOCALES.contains(&self.forms.locale.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "forms.locale must be one of {SUPPORTED_LOCALES:?}, got '{}'",
                self.forms.locale
            )));
        }

        Ok(())
    }

    /// Whether both halves of the app credentials are present.
    pub fn has_credentials(&self) -> bool {
        self.credentials
            .client_id
            .as_deref()
            .is_some_and(|s| !s.is_empty())
            && self
                .credentials
                .client_secret
                .as_deref()
                .is_some_and(|s| !s.is_empty())
    }

    /// A copy safe to print: secrets replaced by a marker.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.credentials.client_secret.is_some() {
            config.credentials.client_secret = Some("[REDACTED]".into());
        }
        config
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
