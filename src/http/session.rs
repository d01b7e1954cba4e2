//! One configured HTTP endpoint backed by a shared blocking client

use hubclient_core_resilience::{Endpoint, RegistryError};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Certificate, Method};
use std::time::Duration;
use tracing::debug;

use crate::config::HttpSessionConfig;
use crate::error::HttpError;

pub const AUTH_METHOD_BASIC: &str = "basic";

#[derive(Debug, Clone)]
struct BasicAuth {
    username: String,
    password: Option<String>,
}

/// HTTP endpoint: base address, timeout, auth and a connection-reusing client
///
/// `reqwest::blocking::Client` is internally reference counted and safe to
/// share between threads, so one session serves every concurrent call.
#[derive(Debug, Clone)]
pub struct HttpSession {
    alias: String,
    host: String,
    port: u16,
    timeout: Duration,
    auth: Option<BasicAuth>,
    client: Client,
}

impl HttpSession {
    pub fn new(config: &HttpSessionConfig) -> Result<Self, HttpError> {
        let port = check_session(config)?;

        let auth = match config.auth_type.as_deref() {
            None => None,
            Some(kind) if kind.eq_ignore_ascii_case(AUTH_METHOD_BASIC) => Some(BasicAuth {
                username: config.username.clone().unwrap_or_default(),
                password: config.password.clone(),
            }),
            Some(other) => {
                return Err(HttpError::Config(format!(
                    "session '{}': '{}' authentication is not implemented",
                    config.alias, other
                )))
            }
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let mut builder = Client::builder().timeout(timeout);

        if let Some(ref path) = config.verify {
            let pem = std::fs::read(path).map_err(|e| {
                HttpError::Config(format!(
                    "session '{}': cannot read certificate {}: {}",
                    config.alias,
                    path.display(),
                    e
                ))
            })?;
            let certificate = Certificate::from_pem(&pem).map_err(|e| {
                HttpError::Config(format!(
                    "session '{}': invalid certificate {}: {}",
                    config.alias,
                    path.display(),
                    e
                ))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder
            .build()
            .map_err(|e| HttpError::Config(format!("session '{}': {}", config.alias, e)))?;

        debug!(
            alias = %config.alias,
            "HTTP session {}:{} (timeout {:?}, auth {})",
            config.host,
            port,
            timeout,
            if auth.is_some() { AUTH_METHOD_BASIC } else { "none" }
        );

        Ok(Self {
            alias: config.alias.clone(),
            host: config.host.trim_end_matches('/').to_string(),
            port,
            timeout,
            auth,
            client,
        })
    }

    /// Absolute URL for a route path: `host:port/path`
    pub fn url(&self, path: &str) -> String {
        format!("{}:{}/{}", self.host, self.port, path.trim_start_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn basic_auth_user(&self) -> Option<&str> {
        self.auth.as_ref().map(|a| a.username.as_str())
    }

    /// Start a request with session-level auth applied
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.auth {
            Some(ref auth) => builder.basic_auth(&auth.username, auth.password.as_ref()),
            None => builder,
        }
    }
}

impl Endpoint for HttpSession {
    const KIND: &'static str = "http";

    fn alias(&self) -> &str {
        &self.alias
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.host.is_empty() {
            return Err(RegistryError::Invalid {
                alias: self.alias.clone(),
                reason: "host is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Required fields of a session; returns the port
fn check_session(config: &HttpSessionConfig) -> Result<u16, RegistryError> {
    let invalid = |reason: &str| RegistryError::Invalid {
        alias: config.alias.clone(),
        reason: reason.to_string(),
    };

    if config.alias.trim().is_empty() {
        return Err(invalid("alias is required"));
    }
    if config.host.trim().is_empty() {
        return Err(invalid("host is required"));
    }
    match config.port {
        Some(port) if port != 0 => Ok(port),
        _ => Err(invalid("port is required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HttpSessionConfig {
        HttpSessionConfig {
            alias: "main".into(),
            host: "http://hub.local/".into(),
            port: Some(8080),
            timeout_secs: 30,
            ..Default::default()
        }
    }

    #[test]
    fn test_url_join() {
        let session = HttpSession::new(&config()).unwrap();
        assert_eq!(session.url("/api/ping"), "http://hub.local:8080/api/ping");
        assert_eq!(session.url("api/ping"), "http://hub.local:8080/api/ping");
        assert_eq!(session.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_host_rejected() {
        let err = HttpSession::new(&HttpSessionConfig {
            host: String::new(),
            ..config()
        })
        .unwrap_err();
        assert!(err.to_string().contains("host is required"));
    }

    #[test]
    fn test_missing_port_rejected() {
        let err = HttpSession::new(&HttpSessionConfig {
            port: None,
            ..config()
        })
        .unwrap_err();
        assert!(matches!(err, HttpError::Registry(RegistryError::Invalid { .. })));
        assert!(err.to_string().contains("port is required"));
    }

    #[test]
    fn test_basic_auth() {
        let session = HttpSession::new(&HttpSessionConfig {
            auth_type: Some("basic".into()),
            username: Some("till".into()),
            password: Some("secret".into()),
            ..config()
        })
        .unwrap();
        assert_eq!(session.basic_auth_user(), Some("till"));
    }

    #[test]
    fn test_unknown_auth_rejected() {
        let err = HttpSession::new(&HttpSessionConfig {
            auth_type: Some("ntlm".into()),
            ..config()
        })
        .unwrap_err();
        assert!(matches!(err, HttpError::Config(_)));
    }

    #[test]
    fn test_unreadable_certificate_rejected() {
        let err = HttpSession::new(&HttpSessionConfig {
            verify: Some("/nonexistent/ca.pem".into()),
            ..config()
        })
        .unwrap_err();
        assert!(err.to_string().contains("cannot read certificate"));
    }
}
