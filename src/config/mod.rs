//! Configuration management
//!
//! Configuration is read from `config.yml` and can be overridden with
//! `FORUM_*` environment variables. Missing values fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Registration policy
    #[serde(default)]
    pub registration: RegistrationConfig,
    /// Request throttling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Upper bound for handling a single request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path, `sqlite:` URL or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Bound applied to every store call, in milliseconds
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// In-memory database, used by tests
    pub fn in_memory() -> Self {
        Self {
            url: ":memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn default_database_url() -> String {
    "data/forum.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_query_timeout_ms() -> u64 {
    4000
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,
    /// Whether a successful lookup pushes the expiry forward
    #[serde(default)]
    pub expiry_policy: ExpiryPolicy,
    /// Name of the cookie carrying the session token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            expiry_policy: ExpiryPolicy::default(),
            cookie_name: default_cookie_name(),
        }
    }
}

/// Longest accepted session lifetime (30 days)
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Longest accepted login failure window (one day)
pub const MAX_LOGIN_WINDOW_MINUTES: i64 = 24 * 60;

impl SessionConfig {
    /// Session lifetime, capped at `MAX_SESSION_TTL_SECS`
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_seconds.min(MAX_SESSION_TTL_SECS) as i64)
    }
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_cookie_name() -> String {
    "session".to_string()
}

/// Session expiry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Expiry is set once at creation
    #[default]
    Fixed,
    /// Every successful resolve moves expiry to now + ttl
    Sliding,
}

impl FromStr for ExpiryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "sliding" => Ok(Self::Sliding),
            _ => Err(format!("Unknown expiry policy: {}", s)),
        }
    }
}

impl fmt::Display for ExpiryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Sliding => write!(f, "sliding"),
        }
    }
}

/// Registration policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// How email/username collisions are detected
    #[serde(default)]
    pub uniqueness: UniquenessPolicy,
}

/// Identity uniqueness policy
///
/// `PerField` compares email with emails and username with usernames.
/// `SharedNamespace` also rejects an email equal to an existing username
/// and a username equal to an existing email, since login accepts either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessPolicy {
    #[default]
    PerField,
    SharedNamespace,
}

impl FromStr for UniquenessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per_field" => Ok(Self::PerField),
            "shared_namespace" => Ok(Self::SharedNamespace),
            _ => Err(format!("Unknown uniqueness policy: {}", s)),
        }
    }
}

/// Request throttling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client IP per minute (0 disables)
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Failed logins allowed per identifier within the window (0 disables)
    #[serde(default = "default_login_failures")]
    pub login_failures: u32,
    /// Window for failed logins, in minutes
    #[serde(default = "default_login_window_minutes")]
    pub login_window_minutes: i64,
}

impl RateLimitConfig {
    /// Failed-login window, clamped to `1..=MAX_LOGIN_WINDOW_MINUTES`
    pub fn login_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.login_window_minutes.clamp(1, MAX_LOGIN_WINDOW_MINUTES))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            login_failures: default_login_failures(),
            login_window_minutes: default_login_window_minutes(),
        }
    }
}

fn default_requests_per_minute() -> u32 {
    120
}

fn default_login_failures() -> u32 {
    5
}

fn default_login_window_minutes() -> i64 {
    15
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration.
    /// Invalid YAML is reported with its location.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply `FORUM_*` overrides
    ///
    /// - FORUM_SERVER_HOST / FORUM_SERVER_PORT / FORUM_SERVER_CORS_ORIGIN
    /// - FORUM_DATABASE_URL / FORUM_DATABASE_MAX_CONNECTIONS / FORUM_DATABASE_QUERY_TIMEOUT_MS
    /// - FORUM_SESSION_TTL_SECONDS / FORUM_SESSION_EXPIRY_POLICY / FORUM_SESSION_COOKIE_NAME
    /// - FORUM_REGISTRATION_UNIQUENESS
    /// - FORUM_RATE_LIMIT_REQUESTS_PER_MINUTE
    pub fn load_with_env(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the services cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.session.ttl_seconds > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::ValidationError(format!(
                "session.ttl_seconds must be at most {}",
                MAX_SESSION_TTL_SECS
            )));
        }
        if !(1..=MAX_LOGIN_WINDOW_MINUTES).contains(&self.rate_limit.login_window_minutes) {
            return Err(ConfigError::ValidationError(format!(
                "rate_limit.login_window_minutes must be between 1 and {}",
                MAX_LOGIN_WINDOW_MINUTES
            )));
        }
        if self.database.query_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "database.query_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "session.cookie_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("FORUM_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("FORUM_SERVER_PORT") {
            self.server.port = port;
        }
        if let Ok(cors_origin) = std::env::var("FORUM_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(url) = std::env::var("FORUM_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = env_parse::<u32>("FORUM_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = max;
        }
        if let Some(ms) = env_parse::<u64>("FORUM_DATABASE_QUERY_TIMEOUT_MS") {
            self.database.query_timeout_ms = ms;
        }

        if let Some(ttl) = env_parse::<u64>("FORUM_SESSION_TTL_SECONDS") {
            self.session.ttl_seconds = ttl;
        }
        if let Some(policy) = env_parse::<ExpiryPolicy>("FORUM_SESSION_EXPIRY_POLICY") {
            self.session.expiry_policy = policy;
        }
        if let Ok(name) = std::env::var("FORUM_SESSION_COOKIE_NAME") {
            self.session.cookie_name = name;
        }

        if let Some(policy) = env_parse::<UniquenessPolicy>("FORUM_REGISTRATION_UNIQUENESS") {
            self.registration.uniqueness = policy;
        }

        if let Some(rpm) = env_parse::<u32>("FORUM_RATE_LIMIT_REQUESTS_PER_MINUTE") {
            self.rate_limit.requests_per_minute = rpm;
        }
    }
}

/// Read and parse an environment variable, ignoring invalid values
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches FORUM_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "FORUM_SERVER_HOST",
    "FORUM_SERVER_PORT",
    "FORUM_SERVER_CORS_ORIGIN",
    "FORUM_DATABASE_URL",
    "FORUM_DATABASE_MAX_CONNECTIONS",
    "FORUM_DATABASE_QUERY_TIMEOUT_MS",
    "FORUM_SESSION_TTL_SECONDS",
    "FORUM_SESSION_EXPIRY_POLICY",
    "FORUM_SESSION_COOKIE_NAME",
    "FORUM_REGISTRATION_UNIQUENESS",
    "FORUM_RATE_LIMIT_REQUESTS_PER_MINUTE",
];
