/*!
 * Error types for hubclient
 */

use hubclient_core_resilience::{DbError, RegistryError, Transient};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Configuration loading and validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown {kind} '{name}'")]
    Unknown { kind: &'static str, name: String },

    #[error("Failed to create log filter: {0}")]
    LogFilter(String),

    #[error("Failed to create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `$(name)` substitution failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("No value supplied for dynamic variable '{0}'")]
    MissingValue(String),
}

/// HTTP transport failures
#[derive(Debug, Error)]
pub enum HttpError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("HTTP configuration error: {0}")]
    Config(String),

    #[error("Failed to load scheme {path}: {reason}")]
    Scheme { path: PathBuf, reason: String },

    #[error("Route '{alias}' not found, must be one of: {known}")]
    UnknownRoute { alias: String, known: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Failed to build request: {0}")]
    Request(String),

    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    /// Classify a reqwest failure for the given URL
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            HttpError::Timeout { url }
        } else if err.is_connect() {
            HttpError::Connect { url, source: err }
        } else if err.is_builder() {
            HttpError::Request(err.to_string())
        } else {
            HttpError::Transport { url, source: err }
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Connect { .. } | HttpError::Timeout { .. } | HttpError::Transport { .. } => true,
            HttpError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}

impl Transient for HttpError {
    fn is_transient(&self) -> bool {
        HttpError::is_transient(self)
    }
}

/// gRPC transport failures
#[derive(Debug, Error)]
pub enum GrpcError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("gRPC configuration error: {0}")]
    Config(String),

    #[error("Invalid channel url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("gRPC call failed: {0}")]
    Status(#[from] tonic::Status),
}

impl GrpcError {
    pub fn is_transient(&self) -> bool {
        use tonic::Code;
        match self {
            GrpcError::Status(status) => matches!(
                status.code(),
                Code::Unavailable
                    | Code::DeadlineExceeded
                    | Code::ResourceExhausted
                    | Code::Aborted
                    | Code::Unknown
            ),
            _ => false,
        }
    }
}

impl Transient for GrpcError {
    fn is_transient(&self) -> bool {
        GrpcError::is_transient(self)
    }
}

/// SMTP transport failures
#[derive(Debug, Error)]
pub enum SmtpError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("SMTP configuration error: {0}")]
    Config(String),

    #[error("Invalid message: {0}")]
    Message(String),

    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SMTP delivery via {alias} failed: {source}")]
    Delivery {
        alias: String,
        #[source]
        source: lettre::transport::smtp::Error,
    },
}

impl SmtpError {
    pub fn is_transient(&self) -> bool {
        match self {
            // Permanent 5xx replies (bad recipient, rejected sender) will fail everywhere.
            SmtpError::Delivery { source, .. } => !source.is_permanent() && !source.is_client(),
            _ => false,
        }
    }
}

impl Transient for SmtpError {
    fn is_transient(&self) -> bool {
        SmtpError::is_transient(self)
    }
}

/// Umbrella error for application wiring and the CLI
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Grpc(#[from] GrpcError),

    #[error(transparent)]
    Smtp(#[from] SmtpError),

    #[error("Transport '{name}' is not a {expected} transport")]
    TransportKind { name: String, expected: &'static str },
}

impl ClientError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Config(_) | ClientError::TransportKind { .. } => EXIT_CONFIG,
            ClientError::Http(HttpError::Registry(_) | HttpError::Config(_) | HttpError::Scheme { .. })
            | ClientError::Grpc(GrpcError::Registry(_) | GrpcError::Config(_) | GrpcError::InvalidUrl { .. })
            | ClientError::Smtp(SmtpError::Registry(_) | SmtpError::Config(_)) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }

    /// Check if this error is transient (worth retrying later)
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Database(e) => e.is_transient(),
            ClientError::Http(e) => e.is_transient(),
            ClientError::Grpc(e) => e.is_transient(),
            ClientError::Smtp(e) => e.is_transient(),
            ClientError::Config(_) | ClientError::TransportKind { .. } => false,
        }
    }
}
