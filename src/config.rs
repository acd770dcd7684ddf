//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chat::ReducerConfig;
use crate::gateway::{BackoffConfig, GatewayConfig};
use crate::server::ServerConfig;
use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub gateway: GatewaySettings,

    #[serde(default)]
    pub chat: ChatSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection hub server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl HubSettings {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            ws_path: self.ws_path.clone(),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
        }
    }
}

/// Upstream gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// Gateway endpoint; the bridge is disabled when unset
    pub url: Option<String>,

    pub token: Option<String>,

    pub display_name: Option<String>,

    /// Only relay chat events for this session
    pub session_key: Option<String>,

    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_role")]
    pub role: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default = "default_connect_delay")]
    pub connect_delay_ms: u64,

    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_mode() -> String {
    "ui".to_string()
}

fn default_role() -> String {
    "operator".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["operator.read".to_string(), "operator.write".to_string()]
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_connect_delay() -> u64 {
    750
}

fn default_backoff_initial() -> u64 {
    800
}

fn default_backoff_max() -> u64 {
    15_000
}

fn default_backoff_factor() -> f64 {
    1.7
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            display_name: None,
            session_key: None,
            mode: default_mode(),
            role: default_role(),
            scopes: default_scopes(),
            locale: default_locale(),
            connect_delay_ms: default_connect_delay(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl GatewaySettings {
    /// Client configuration, or `None` when no gateway URL is configured
    pub fn client_config(&self) -> Option<GatewayConfig> {
        let url = self.url.as_deref().filter(|url| !url.trim().is_empty())?;
        Some(GatewayConfig {
            url: url.to_string(),
            token: self.token.clone().filter(|token| !token.is_empty()),
            display_name: self.display_name.clone(),
            mode: self.mode.clone(),
            role: self.role.clone(),
            scopes: self.scopes.clone(),
            locale: self.locale.clone(),
            connect_delay: Duration::from_millis(self.connect_delay_ms),
            backoff: BackoffConfig {
                initial: Duration::from_millis(self.backoff_initial_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                factor: self.backoff_factor,
            }
            .normalized(),
            ..GatewayConfig::default()
        })
    }
}

/// Chat reducer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_committed_capacity")]
    pub committed_capacity: usize,

    #[serde(default = "default_dedup_window")]
    pub dedup_window_ms: u64,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_committed_capacity() -> usize {
    256
}

fn default_dedup_window() -> u64 {
    1500
}

fn default_history_limit() -> usize {
    500
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            committed_capacity: default_committed_capacity(),
            dedup_window_ms: default_dedup_window(),
            history_limit: default_history_limit(),
        }
    }
}

impl ChatSettings {
    pub fn reducer_config(&self) -> ReducerConfig {
        ReducerConfig {
            committed_capacity: self.committed_capacity,
            dedup_window: Duration::from_millis(self.dedup_window_ms),
            history_limit: self.history_limit,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("gatelink").join("config.toml")),
            Some(PathBuf::from("/etc/gatelink/config.toml")),
            Some(PathBuf::from("./gatelink.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Hub overrides
        if let Some(host) = var("GATELINK_HUB_HOST") {
            self.hub.host = host;
        }
        if let Some(port) = var("GATELINK_HUB_PORT") {
            match port.parse() {
                Ok(p) => self.hub.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid GATELINK_HUB_PORT"),
            }
        }

        // Gateway overrides
        if let Some(url) = var("GATELINK_GATEWAY_URL") {
            self.gateway.url = Some(url);
        }
        if let Some(token) = var("GATELINK_GATEWAY_TOKEN") {
            self.gateway.token = Some(token);
        }

        // Logging overrides
        if let Some(level) = var("GATELINK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("GATELINK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# gatelink Configuration
#
# Environment variables override these settings:
# - GATELINK_HUB_HOST
# - GATELINK_HUB_PORT
# - GATELINK_GATEWAY_URL
# - GATELINK_GATEWAY_TOKEN
# - GATELINK_LOG_LEVEL
# - GATELINK_LOG_FORMAT

[hub]
# Address the connection hub listens on
host = "0.0.0.0"
port = 8090

# Path that accepts WebSocket upgrades
ws_path = "/ws"

# Seconds between heartbeat probes; silent connections are dropped
# after two intervals
heartbeat_interval_secs = 30

[gateway]
# Upstream gateway endpoint. Leave unset to run the hub alone.
# url = "ws://127.0.0.1:18789"

# Bearer token presented during the handshake
# token = ""

# Only relay chat for this session
# session_key = "main"

mode = "ui"
role = "operator"
scopes = ["operator.read", "operator.write"]
locale = "en-US"

# Wait this long for a connect challenge before sending connect anyway (ms)
connect_delay_ms = 750

# Reconnect backoff (ms)
backoff_initial_ms = 800
backoff_max_ms = 15000
backoff_factor = 1.7

[chat]
# How many finished run ids to remember for de-duplication
committed_capacity = 256

# Two finals without a run id inside this window count as one (ms)
dedup_window_ms = 1500

# Finished turns kept in memory by the server's bridge
history_limit = 500

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
