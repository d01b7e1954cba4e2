//! Hubclient Core Resilience: resource pooling and endpoint failover
//!
//! # Overview
//!
//! This crate holds the concurrency-sensitive part of hubclient:
//!
//! - **Connection Pool**: bounded pool of expensive resources with overflow capacity,
//!   blocking acquisition with timeout and thread-safe accounting
//! - **Endpoint Registry**: validated, ordered list of equivalent endpoints
//! - **Failover Executor**: runs one operation against endpoints in priority order
//! - **Error Taxonomy**: closed driver error classes and their mapping to [`DbError`]
//! - **Redaction**: size-capped payload rendering for logs
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Database drivers (a connection is anything implementing [`PooledResource`])
//! - Network protocols (an endpoint is anything implementing [`Endpoint`])
//! - Configuration formats
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Transport / DAO                 │
//! └─────────────┬───────────────────────────┘
//!               │ operation(endpoint)
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Failover Executor                 │  ← Priority order, policy
//! │  (A fails → B fails → C succeeds)       │
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │       Endpoint Registry                 │  ← Validated once
//! │  (sessions, channels, relays)           │
//! └─────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────┐
//! │       Connection Pool                   │  ← Database connections
//! │  (idle queue + overflow counter)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ## Failover
//!
//! ```
//! use hubclient_core_resilience::{DbError, Endpoint, EndpointRegistry, FailoverExecutor};
//!
//! struct Replica(&'static str);
//!
//! impl Endpoint for Replica {
//!     const KIND: &'static str = "replica";
//!
//!     fn alias(&self) -> &str {
//!         self.0
//!     }
//! }
//!
//! let registry = EndpointRegistry::new(vec![Replica("primary"), Replica("standby")]).unwrap();
//! let result = FailoverExecutor::default().run(&registry, |replica| match replica.0 {
//!     "primary" => Err(DbError::Operational("connection lost".into())),
//!     other => Ok(other),
//! });
//!
//! assert_eq!(result.unwrap(), "standby");
//! ```
//!
//! ## Connection Pool
//!
//! ```no_run
//! use hubclient_core_resilience::{ConnectionPool, Credentials, DbError, DriverError, PoolConfig, PooledResource};
//! use std::sync::Arc;
//!
//! struct MyConnection;
//!
//! impl PooledResource for MyConnection {
//!     fn close(&mut self) -> Result<(), DriverError> {
//!         Ok(())
//!     }
//! }
//!
//! # fn example() -> Result<(), DbError> {
//! let pool = ConnectionPool::new(
//!     Arc::new(|_: &Credentials| Ok(MyConnection)),
//!     Credentials::new(),
//!     PoolConfig::default(),
//! );
//!
//! {
//!     let _conn = pool.checkout()?;
//!     // Use connection...
//! } // returned to the pool here
//!
//! pool.dispose();
//! # Ok(())
//! # }
//! ```

pub mod connection_pool;
pub mod endpoint;
pub mod error;
pub mod failover;
pub mod redact;

// Re-export main types for convenience
pub use connection_pool::{
    Acquirable, ConnectionFactory, ConnectionPool, Credentials, Disposable, PoolConfig,
    PoolStatus, PooledConnection, PooledResource, Releasable, UNLIMITED_OVERFLOW,
};
pub use endpoint::{Endpoint, EndpointRegistry};
pub use error::{DbError, DriverError, DriverErrorClass, RegistryError};
pub use failover::{FailoverExecutor, FailoverPolicy, Transient};
pub use redact::{Redactor, DEFAULT_MAX_LOG_LENGTH};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use hubclient_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::connection_pool::{
        Acquirable, ConnectionPool, Credentials, Disposable, PoolConfig, PooledResource,
        Releasable,
    };
    pub use super::endpoint::{Endpoint, EndpointRegistry};
    pub use super::error::{DbError, DriverError, DriverErrorClass};
    pub use super::failover::{FailoverExecutor, FailoverPolicy, Transient};
}
