/*!
 * Application wiring
 *
 * Builds every pool and transport declared in the configuration exactly once
 * and hands them out by name.
 */

use hubclient_core_resilience::Redactor;
use std::collections::BTreeMap;
use tokio::runtime::Handle;
use tracing::info;

use crate::config::{AppConfig, TransportConfig};
use crate::dba::{Dao, DriverRegistry};
use crate::error::{ClientError, ConfigError, Result};
use crate::grpc::GrpcFactory;
use crate::http::HttpFactory;
use crate::smtp::SmtpFactory;

#[derive(Debug)]
enum Transport {
    Http(HttpFactory),
    Grpc(GrpcFactory),
    Smtp(SmtpFactory),
}

/// Everything a running application talks to
#[derive(Debug)]
pub struct AppContext {
    application: String,
    redactor: Redactor,
    databases: BTreeMap<String, Dao>,
    transports: BTreeMap<String, Transport>,
}

impl AppContext {
    /// Construct every database pool and transport
    ///
    /// Blocking HTTP and SMTP clients are built on the calling thread, which
    /// must not be a runtime worker; gRPC channels are bound to `handle`.
    pub fn build(config: &AppConfig, drivers: &DriverRegistry, handle: &Handle) -> Result<Self> {
        config.validate()?;
        let redactor = Redactor::new(config.limits.max_log_length);

        let mut databases = BTreeMap::new();
        for (name, database) in &config.database {
            databases.insert(
                name.clone(),
                Dao::new(name, database, drivers)?.with_redactor(redactor),
            );
        }

        let mut transports = BTreeMap::new();
        for (name, transport) in &config.transport {
            let built = match transport {
                TransportConfig::Http(http) => Transport::Http(HttpFactory::new(http, redactor)?),
                TransportConfig::Grpc(grpc) => {
                    Transport::Grpc(GrpcFactory::new(grpc, redactor, handle)?)
                }
                TransportConfig::Smtp(smtp) => Transport::Smtp(SmtpFactory::new(smtp, redactor)?),
            };
            info!("Transport '{}' ({}) ready", name, transport.kind());
            transports.insert(name.clone(), built);
        }

        info!(
            "{}: {} databases, {} transports",
            config.application,
            databases.len(),
            transports.len()
        );

        Ok(Self {
            application: config.application.clone(),
            redactor,
            databases,
            transports,
        })
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn database(&self, name: &str) -> Result<&Dao> {
        self.databases.get(name).ok_or_else(|| unknown("database", name))
    }

    pub fn http(&self, name: &str) -> Result<&HttpFactory> {
        match self.transport(name)? {
            Transport::Http(factory) => Ok(factory),
            _ => Err(wrong_kind(name, "http")),
        }
    }

    pub fn grpc(&self, name: &str) -> Result<&GrpcFactory> {
        match self.transport(name)? {
            Transport::Grpc(factory) => Ok(factory),
            _ => Err(wrong_kind(name, "grpc")),
        }
    }

    pub fn smtp(&self, name: &str) -> Result<&SmtpFactory> {
        match self.transport(name)? {
            Transport::Smtp(factory) => Ok(factory),
            _ => Err(wrong_kind(name, "smtp")),
        }
    }

    /// Names of all configured transports
    pub fn transports(&self) -> Vec<&str> {
        self.transports.keys().map(String::as_str).collect()
    }

    /// Close idle connections of every pool
    pub fn shutdown(&self) {
        for (name, dao) in &self.databases {
            info!("Disposing database '{}': {}", name, dao.status());
            dao.dispose();
        }
    }

    fn transport(&self, name: &str) -> Result<&Transport> {
        self.transports.get(name).ok_or_else(|| unknown("transport", name))
    }
}

fn unknown(kind: &'static str, name: &str) -> ClientError {
    ConfigError::Unknown {
        kind,
        name: name.to_string(),
    }
    .into()
}

fn wrong_kind(name: &str, expected: &'static str) -> ClientError {
    ClientError::TransportKind {
        name: name.to_string(),
        expected,
    }
}
