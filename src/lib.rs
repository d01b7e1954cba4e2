/*!
 * hubclient - client framework for edge applications talking to a central hub
 *
 * - Bounded connection pools with overflow accounting and RAII checkout
 * - Ordered endpoint registries with failover on transient errors
 * - Route-driven HTTP calls with `$(name)` templating and content-type
 *   driven response decoding (JSON, XML, zip archives, text)
 * - gRPC channels and SMTP relays behind the same failover executor
 * - Explicit application wiring from one TOML configuration file
 */

pub mod config;
pub mod context;
pub mod dba;
pub mod error;
pub mod extract;
pub mod grpc;
pub mod http;
pub mod logging;
pub mod smtp;
pub mod template;

// Re-export commonly used types
pub use config::{AppConfig, TransportConfig};
pub use context::AppContext;
pub use dba::{Connection, Dao, DriverRegistry, Fetch, Rows, Transaction};
pub use error::{ClientError, Result};
pub use extract::{ExtractStrategy, ExtractionPipeline, Payload, RawResponse};
pub use grpc::{GrpcCall, GrpcFactory};
pub use http::{HttpFactory, HttpRequest};
pub use smtp::{Mail, SmtpFactory};

pub use hubclient_core_resilience as resilience;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
