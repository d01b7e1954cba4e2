//! Route table: logical operation name to URL template, method and headers

use reqwest::Method;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use crate::config::{RouteConfig, SchemeConfig, SchemeSource};
use crate::error::HttpError;

#[derive(Debug, Clone)]
pub struct Route {
    pub alias: String,
    /// Path template relative to the session base URL
    pub url: String,
    pub method: Method,
    /// Header templates
    pub headers: BTreeMap<String, String>,
    /// Charset forced when decoding the response
    pub decode: Option<String>,
    /// Overrides the session timeout
    pub timeout: Option<Duration>,
}

impl Route {
    fn from_config(config: RouteConfig) -> Result<Self, HttpError> {
        let method = Method::from_bytes(config.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                HttpError::Config(format!(
                    "route '{}': invalid method '{}'",
                    config.alias, config.method
                ))
            })?;

        Ok(Self {
            alias: config.alias,
            url: config.url,
            method,
            headers: config.headers,
            decode: config.decode,
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build from an inline scheme or a JSON scheme file
    pub fn from_source(source: &SchemeSource) -> Result<Self, HttpError> {
        match source {
            SchemeSource::Inline(scheme) => Self::from_scheme(scheme.clone()),
            SchemeSource::File(path) => Self::from_scheme(load_scheme(path)?),
        }
    }

    pub fn from_scheme(scheme: SchemeConfig) -> Result<Self, HttpError> {
        if scheme.paths.is_empty() {
            return Err(HttpError::Config(
                "scheme must describe at least one route in 'paths'".to_string(),
            ));
        }

        let mut routes: Vec<Route> = Vec::with_capacity(scheme.paths.len());
        for config in scheme.paths {
            if routes.iter().any(|r| r.alias == config.alias) {
                return Err(HttpError::Config(format!("duplicate route '{}'", config.alias)));
            }
            routes.push(Route::from_config(config)?);
        }

        Ok(Self { routes })
    }

    pub fn get(&self, alias: &str) -> Result<&Route, HttpError> {
        self.routes
            .iter()
            .find(|r| r.alias == alias)
            .ok_or_else(|| HttpError::UnknownRoute {
                alias: alias.to_string(),
                known: self.aliases().join(", "),
            })
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.alias.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.routes.iter()
    }
}

fn load_scheme(path: &Path) -> Result<SchemeConfig, HttpError> {
    let scheme_error = |reason: String| HttpError::Scheme {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| scheme_error(e.to_string()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| scheme_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn route(alias: &str, method: &str) -> RouteConfig {
        RouteConfig {
            alias: alias.into(),
            url: format!("api/{}", alias),
            method: method.into(),
            headers: BTreeMap::new(),
            decode: None,
            timeout_secs: None,
        }
    }

    #[test]
    fn test_lookup_and_unknown_route() {
        let table = RouteTable::from_scheme(SchemeConfig {
            paths: vec![route("ping", "get"), route("upload", "POST")],
        })
        .unwrap();

        assert_eq!(table.get("ping").unwrap().method, Method::GET);
        assert_eq!(table.get("upload").unwrap().method, Method::POST);

        let err = table.get("missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Route 'missing' not found, must be one of: ping, upload"
        );
    }

    #[test]
    fn test_empty_scheme_rejected() {
        assert!(matches!(
            RouteTable::from_scheme(SchemeConfig::default()),
            Err(HttpError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_method_rejected() {
        let err = RouteTable::from_scheme(SchemeConfig {
            paths: vec![route("ping", "GE T")],
        })
        .unwrap_err();
        assert!(err.to_string().contains("invalid method"));
    }

    #[test]
    fn test_scheme_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"paths": [{{"alias": "hash", "url": "api/hash/$(store)", "method": "POST",
                 "headers": {{"X-Store": "$(store)"}}, "decode": "cp1251", "timeout": 5}}]}}"#
        )
        .unwrap();

        let table = RouteTable::from_source(&SchemeSource::File(file.path().to_path_buf())).unwrap();
        let hash = table.get("hash").unwrap();
        assert_eq!(hash.url, "api/hash/$(store)");
        assert_eq!(hash.decode.as_deref(), Some("cp1251"));
        assert_eq!(hash.timeout, Some(Duration::from_secs(5)));
        assert_eq!(hash.headers["X-Store"], "$(store)");
    }

    #[test]
    fn test_missing_scheme_file() {
        let err = RouteTable::from_source(&SchemeSource::File("/nonexistent/scheme.json".into()))
            .unwrap_err();
        assert!(matches!(err, HttpError::Scheme { .. }));
    }
}
