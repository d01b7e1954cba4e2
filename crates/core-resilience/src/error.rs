//! Error taxonomy for pooled resources and endpoint registries
//!
//! Database drivers report failures as a [`DriverError`] tagged with one of the
//! well-known [`DriverErrorClass`] categories. The pool and the DAO layer never
//! inspect driver-specific types: they reclassify through the closed mapping in
//! `From<DriverError> for DbError`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Well-known error categories a driver can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorClass {
    /// Misuse of the driver interface rather than a database failure
    Interface,
    /// Generic database failure
    Database,
    /// Problems with the processed data (division by zero, value out of range)
    Data,
    /// Failures outside the programmer's control (disconnects, memory, unknown DSN)
    Operational,
    /// Relational integrity violated (foreign key, unique constraint)
    Integrity,
    /// Driver internal failure (stale cursor, transaction out of sync)
    Internal,
    /// Programming errors (missing table, SQL syntax, wrong parameter count)
    Programming,
    /// API used that the database does not support
    NotSupported,
    /// Anything the driver could not classify
    Unclassified,
}

impl DriverErrorClass {
    pub const ALL: [DriverErrorClass; 9] = [
        DriverErrorClass::Interface,
        DriverErrorClass::Database,
        DriverErrorClass::Data,
        DriverErrorClass::Operational,
        DriverErrorClass::Integrity,
        DriverErrorClass::Internal,
        DriverErrorClass::Programming,
        DriverErrorClass::NotSupported,
        DriverErrorClass::Unclassified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverErrorClass::Interface => "interface",
            DriverErrorClass::Database => "database",
            DriverErrorClass::Data => "data",
            DriverErrorClass::Operational => "operational",
            DriverErrorClass::Integrity => "integrity",
            DriverErrorClass::Internal => "internal",
            DriverErrorClass::Programming => "programming",
            DriverErrorClass::NotSupported => "not_supported",
            DriverErrorClass::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for DriverErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverErrorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        DriverErrorClass::ALL
            .iter()
            .copied()
            .find(|class| class.as_str() == normalized)
            .ok_or_else(|| format!("unknown driver error class '{}'", s))
    }
}

/// Failure reported by a database driver.
#[derive(Debug, Error)]
#[error("{class} error: {message}")]
pub struct DriverError {
    pub class: DriverErrorClass,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DriverError {
    pub fn new(class: DriverErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying driver error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Classified database and pool errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Interface error: {0}")]
    Interface(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Operational error: {0}")]
    Operational(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Programming error: {0}")]
    Programming(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Driver failure without a well-known class, passed through unchanged
    #[error("Driver error: {0}")]
    Driver(DriverError),

    /// Overflow limit reached and the pool is configured not to wait
    #[error("Connection pool overflow (pool size {pool_size}, max overflow {max_overflow})")]
    Overflow { pool_size: usize, max_overflow: isize },

    /// No connection became available within the acquire timeout
    #[error("Timed out after {0:?} waiting for a pooled connection")]
    Timeout(Duration),
}

impl DbError {
    /// Check if this error is worth retrying against another endpoint
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::Operational(_)
                | DbError::Interface(_)
                | DbError::Overflow { .. }
                | DbError::Timeout(_)
        )
    }

    /// Driver class this error was classified from, if any
    pub fn class(&self) -> Option<DriverErrorClass> {
        match self {
            DbError::Interface(_) => Some(DriverErrorClass::Interface),
            DbError::Database(_) => Some(DriverErrorClass::Database),
            DbError::Data(_) => Some(DriverErrorClass::Data),
            DbError::Operational(_) => Some(DriverErrorClass::Operational),
            DbError::Integrity(_) => Some(DriverErrorClass::Integrity),
            DbError::Internal(_) => Some(DriverErrorClass::Internal),
            DbError::Programming(_) => Some(DriverErrorClass::Programming),
            DbError::NotSupported(_) => Some(DriverErrorClass::NotSupported),
            DbError::Driver(e) => Some(e.class),
            DbError::Overflow { .. } | DbError::Timeout(_) => None,
        }
    }
}

impl From<DriverError> for DbError {
    fn from(err: DriverError) -> Self {
        match err.class {
            DriverErrorClass::Interface => DbError::Interface(err.message),
            DriverErrorClass::Database => DbError::Database(err.message),
            DriverErrorClass::Data => DbError::Data(err.message),
            DriverErrorClass::Operational => DbError::Operational(err.message),
            DriverErrorClass::Integrity => DbError::Integrity(err.message),
            DriverErrorClass::Internal => DbError::Internal(err.message),
            DriverErrorClass::Programming => DbError::Programming(err.message),
            DriverErrorClass::NotSupported => DbError::NotSupported(err.message),
            DriverErrorClass::Unclassified => DbError::Driver(err),
        }
    }
}

/// Errors raised while building an [`EndpointRegistry`](crate::EndpointRegistry)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No {kind} endpoints configured")]
    Empty { kind: &'static str },

    #[error("Endpoint '{alias}' is invalid: {reason}")]
    Invalid { alias: String, reason: String },

    #[error("Duplicate endpoint alias '{0}'")]
    DuplicateAlias(String),
}
