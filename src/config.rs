/*!
 * Configuration types for hubclient
 *
 * One `AppConfig` is loaded at process start and handed by reference to every
 * component constructor.
 */

use hubclient_core_resilience::{DriverErrorClass, FailoverPolicy, PoolConfig, DEFAULT_MAX_LOG_LENGTH};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "HUBCLIENT_CONFIG";

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name, used in logs
    pub application: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    /// Pooled database connections by name
    #[serde(default)]
    pub database: BTreeMap<String, DatabaseConfig>,

    /// Outbound transports by name
    #[serde(default)]
    pub transport: BTreeMap<String, TransportConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Write JSON logs to this file instead of stdout
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Force debug level
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Payloads longer than this are compressed or elided in logs
    #[serde(default = "default_max_log_length")]
    pub max_log_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_log_length: default_max_log_length(),
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// A pooled database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Name of a registered connection factory
    pub driver: String,

    /// Opaque parameters passed to the driver
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,

    #[serde(default)]
    pub pool: PoolSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// `-1` disables the ceiling
    #[serde(default = "default_max_overflow")]
    pub max_overflow: isize,

    /// Acquire wait once exhausted; `0` fails fast
    #[serde(default = "default_pool_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub use_lifo: bool,

    /// Driver error classes ignored when closing connections
    #[serde(default)]
    pub suppressed: Vec<String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_overflow: default_max_overflow(),
            timeout_secs: default_pool_timeout(),
            use_lifo: false,
            suppressed: Vec::new(),
        }
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> Result<PoolConfig, ConfigError> {
        if self.max_overflow < -1 {
            return Err(ConfigError::Invalid(format!(
                "max_overflow must be -1 (unlimited) or greater, got {}",
                self.max_overflow
            )));
        }

        let suppressed = self
            .suppressed
            .iter()
            .map(|name| name.parse::<DriverErrorClass>().map_err(ConfigError::Invalid))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PoolConfig {
            pool_size: self.pool_size,
            max_overflow: self.max_overflow,
            timeout: Duration::from_secs(self.timeout_secs),
            use_lifo: self.use_lifo,
            suppressed,
        })
    }
}

/// Outbound transport, tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Http(HttpConfig),
    Grpc(GrpcConfig),
    Smtp(SmtpConfig),
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Http(_) => "http",
            TransportConfig::Grpc(_) => "grpc",
            TransportConfig::Smtp(_) => "smtp",
        }
    }
}

/// Which failures move a call to the next endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailoverMode {
    /// Network, connection and timeout errors only
    #[default]
    Transient,
    /// Every error, including HTTP 4xx and bad requests
    All,
}

impl From<FailoverMode> for FailoverPolicy {
    fn from(mode: FailoverMode) -> Self {
        match mode {
            FailoverMode::Transient => FailoverPolicy::TransientOnly,
            FailoverMode::All => FailoverPolicy::AllErrors,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub sessions: Vec<HttpSessionConfig>,

    /// Route table, inline or a path to a JSON file
    pub scheme: SchemeSource,

    /// Headers sent with every request
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,

    #[serde(default)]
    pub failover: FailoverMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpSessionConfig {
    pub alias: String,

    /// Base address including the scheme, e.g. `http://hub.local`
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,

    /// `basic` or absent
    #[serde(default)]
    pub auth_type: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// PEM root certificate to trust
    #[serde(default)]
    pub verify: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemeSource {
    Inline(SchemeConfig),
    File(PathBuf),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemeConfig {
    #[serde(default)]
    pub paths: Vec<RouteConfig>,
}

/// One logical operation of a remote HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub alias: String,

    /// Path appended to `host:port/`, may contain `$(name)` variables
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// May contain `$(name)` variables
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Charset overriding the response Content-Type
    #[serde(default)]
    pub decode: Option<String>,

    /// Overrides the session timeout
    #[serde(default, alias = "timeout")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcConfig {
    #[serde(default)]
    pub channels: Vec<GrpcChannelConfig>,

    #[serde(default)]
    pub failover: FailoverMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcChannelConfig {
    pub alias: String,

    #[serde(default)]
    pub url: String,

    /// Deadline of every call made through the channel
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,

    /// PEM root certificate; unreadable files fall back to plaintext
    #[serde(default)]
    pub verify: Option<PathBuf>,

    /// Request metadata attached to every call
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Default for GrpcChannelConfig {
    fn default() -> Self {
        Self {
            alias: String::new(),
            url: String::new(),
            timeout_secs: default_session_timeout(),
            verify: None,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub sessions: Vec<SmtpSessionConfig>,

    #[serde(default)]
    pub failover: FailoverMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpSessionConfig {
    pub alias: String,

    #[serde(default)]
    pub host: String,

    /// Defaults to 25
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Upgrade with STARTTLS
    #[serde(default)]
    pub tls: bool,

    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,
}

// Default value functions for serde
fn default_max_log_length() -> usize {
    DEFAULT_MAX_LOG_LENGTH
}

fn default_pool_size() -> usize {
    5
}

fn default_max_overflow() -> isize {
    10
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_session_timeout() -> u64 {
    30
}

fn default_method() -> String {
    "GET".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application.trim().is_empty() {
            return Err(ConfigError::Invalid("application name is required".to_string()));
        }

        for (name, database) in &self.database {
            if database.driver.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("database '{}' has no driver", name)));
            }
            database.pool.to_pool_config().map_err(|e| match e {
                ConfigError::Invalid(reason) => {
                    ConfigError::Invalid(format!("database '{}': {}", name, reason))
                }
                other => other,
            })?;
        }

        if self.limits.max_log_length == 0 {
            return Err(ConfigError::Invalid("max_log_length must be positive".to_string()));
        }

        Ok(())
    }

    pub fn transport(&self, name: &str) -> Result<&TransportConfig, ConfigError> {
        self.transport.get(name).ok_or_else(|| ConfigError::Unknown {
            kind: "transport",
            name: name.to_string(),
        })
    }
}
