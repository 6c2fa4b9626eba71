//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::leads::{LeadSchema, AGENT_ROLE};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend data service (PostgREST + Realtime) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: Option<String>,

    /// API key sent as both `apikey` and bearer token
    pub api_key: Option<String>,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_db_schema")]
    pub db_schema: String,

    /// Column names of the lead table
    #[serde(default)]
    pub fields: LeadSchema,
}

fn default_table() -> String {
    "leads_ouways".to_string()
}

fn default_db_schema() -> String {
    "public".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            table: default_table(),
            db_schema: default_db_schema(),
            fields: LeadSchema::default(),
        }
    }
}

/// Validated connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub api_key: String,
}

impl BackendConfig {
    /// Both the URL and the key, or a configuration error naming what is missing
    ///
    /// Blank values count as missing; partial credentials are never returned.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let url = self.url.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (url, key) {
            (Some(url), Some(key)) => Ok(Credentials {
                base_url: url.trim_end_matches('/').to_string(),
                api_key: key.to_string(),
            }),
            (url, key) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push("url");
                }
                if key.is_none() {
                    missing.push("api_key");
                }
                Err(ConfigError::MissingCredentials(missing.join(", ")))
            }
        }
    }
}

/// Polling and subscription behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_realtime_enabled")]
    pub realtime_enabled: bool,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
}

fn default_poll_interval() -> u64 {
    5000 // 5 seconds
}

fn default_fetch_timeout() -> u64 {
    5000
}

fn default_realtime_enabled() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    30_000
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_max_reconnect_delay() -> u64 {
    60_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            fetch_timeout_ms: default_fetch_timeout(),
            realtime_enabled: default_realtime_enabled(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Per-fetch timeout; zero falls back to the default
    pub fn fetch_timeout(&self) -> Duration {
        match self.fetch_timeout_ms {
            0 => Duration::from_millis(default_fetch_timeout()),
            ms => Duration::from_millis(ms),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Delay before the `attempt`-th reconnect (0-based), doubling up to the cap
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let delay = self
            .reconnect_delay_ms
            .saturating_mul(factor)
            .min(self.max_reconnect_delay_ms.max(self.reconnect_delay_ms));
        Duration::from_millis(delay)
    }
}

/// Statistics derivation settings
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Conversation role counted as automated agent messages
    #[serde(default = "default_agent_role")]
    pub agent_role: String,

    /// How many leads the recent activity list holds
    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: usize,
}

fn default_agent_role() -> String {
    AGENT_ROLE.to_string()
}

fn default_recent_activity_limit() -> usize {
    10
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            agent_role: default_agent_role(),
            recent_activity_limit: default_recent_activity_limit(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

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

impl LoggingConfig {
    /// Install the global tracing subscriber
    ///
    /// `RUST_LOG` wins over the configured level.
    pub fn init(&self) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("leadwatch={},tower_http=debug", self.level))
        });

        let registry = tracing_subscriber::registry().with(filter);
        if self.format == "json" {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
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
    ///
    /// Nothing is logged here since logging is configured from the result;
    /// call [`LoadedConfig::log`] once the subscriber is installed.
    pub fn load_default() -> LoadedConfig {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("leadwatch").join("config.toml")),
            Some(PathBuf::from("/etc/leadwatch/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first candidate that exists and parses, else the environment
    fn load_first(paths: &[PathBuf]) -> LoadedConfig {
        let mut failures = Vec::new();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    return LoadedConfig {
                        config,
                        path: Some(path.clone()),
                        failures,
                    }
                }
                Err(e) => failures.push(e),
            }
        }

        LoadedConfig {
            config: Self::from_env(),
            path: None,
            failures,
        }
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    ///
    /// The unprefixed backend variables take precedence over the
    /// `NEXT_PUBLIC_` ones.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SUPABASE_URL").or_else(|| lookup("NEXT_PUBLIC_SUPABASE_URL")) {
            self.backend.url = Some(url);
        }
        if let Some(key) =
            lookup("SUPABASE_ANON_KEY").or_else(|| lookup("NEXT_PUBLIC_SUPABASE_ANON_KEY"))
        {
            self.backend.api_key = Some(key);
        }
        if let Some(table) = lookup("LEADWATCH_TABLE") {
            self.backend.table = table;
        }

        if let Some(ms) = lookup("LEADWATCH_POLL_INTERVAL_MS").and_then(|s| s.parse().ok()) {
            self.sync.poll_interval_ms = ms;
        }

        if let Some(host) = lookup("LEADWATCH_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("LEADWATCH_API_PORT").and_then(|s| s.parse().ok()) {
            self.api.port = port;
        }

        if let Some(level) = lookup("LEADWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LEADWATCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// A configuration together with where it was found
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    /// Source file; `None` means defaults plus environment
    pub path: Option<PathBuf>,
    /// Candidate files that exist but could not be loaded
    pub failures: Vec<ConfigError>,
}

impl LoadedConfig {
    /// Load an explicitly named file with environment overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            config: Config::load_with_env(path)?,
            path: Some(path.to_path_buf()),
            failures: Vec::new(),
        })
    }

    /// Report the outcome of loading
    pub fn log(&self) {
        for e in &self.failures {
            tracing::warn!(error = %e, "Skipped config file");
        }
        match &self.path {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
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

    #[error("Missing backend configuration: {0}")]
    MissingCredentials(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Leadwatch Configuration
#
# Environment variables override these settings:
# - SUPABASE_URL / NEXT_PUBLIC_SUPABASE_URL
# - SUPABASE_ANON_KEY / NEXT_PUBLIC_SUPABASE_ANON_KEY
# - LEADWATCH_TABLE
# - LEADWATCH_POLL_INTERVAL_MS
# - LEADWATCH_API_HOST
# - LEADWATCH_API_PORT
# - LEADWATCH_LOG_LEVEL
# - LEADWATCH_LOG_FORMAT

[backend]
# Project URL and API key (both required)
# url = "https://your-project.supabase.co"
# api_key = ""

# Lead table and its database schema
table = "leads_ouways"
db_schema = "public"

[backend.fields]
# Column names; the alternate layout uses "status" and "conversation_history"
id_field = "id"
created_at_field = "created_at"
status_field = "statut"
history_field = "historique_conversation"

[sync]
# Backstop polling period (ms)
poll_interval_ms = 5000

# Timeout for a single fetch (ms)
fetch_timeout_ms = 5000

# Subscribe to the change feed
realtime_enabled = true

# Change feed heartbeat period (ms)
heartbeat_interval_ms = 30000

# Reconnect backoff for the change feed (ms)
reconnect_delay_ms = 5000
max_reconnect_delay_ms = 60000

[stats]
# Conversation role counted as agent messages
agent_role = "agent"

# Number of leads in the recent activity list
recent_activity_limit = 10

[api]
host = "0.0.0.0"
port = 8090
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
