//! Per-call request description

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::RequestBuilder;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::HttpError;
use crate::extract::ExtractStrategy;

const MIME_APPLICATION_ZIP: &str = "application/zip";

/// Request body variants
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
    Form(Vec<(String, String)>),
    /// Zip archive uploaded as a multipart file field
    ZipFile {
        field: String,
        file_name: String,
        content: Vec<u8>,
    },
}

impl Body {
    /// Attach to a request; multipart forms are rebuilt for every attempt
    pub(crate) fn apply(&self, builder: RequestBuilder) -> Result<RequestBuilder, HttpError> {
        Ok(match self {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Bytes(bytes) => builder.body(bytes.clone()),
            Body::Form(fields) => builder.form(fields),
            Body::ZipFile {
                field,
                file_name,
                content,
            } => {
                let part = Part::bytes(content.clone())
                    .file_name(file_name.clone())
                    .mime_str(MIME_APPLICATION_ZIP)
                    .map_err(|e| HttpError::Request(e.to_string()))?;
                builder.multipart(Form::new().part(field.clone(), part))
            }
        })
    }

    /// Text form for logs and curl reproduction
    pub fn describe(&self) -> String {
        match self {
            Body::Empty => String::new(),
            Body::Json(value) => value.to_string(),
            Body::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Body::Form(fields) => fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&"),
            Body::ZipFile {
                field, file_name, ..
            } => format!("{}=@{}", field, file_name),
        }
    }
}

/// One logical HTTP call
///
/// # Example
/// ```
/// use hubclient::http::HttpRequest;
/// use serde_json::json;
///
/// let request = HttpRequest::new("receipts")
///     .json(json!({"total": 125.5}))
///     .value("store", "0042")
///     .query("refresh", "true");
///
/// assert_eq!(request.route(), "receipts");
/// ```
#[derive(Clone)]
pub struct HttpRequest {
    route: String,
    pub(crate) body: Body,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) values: HashMap<String, String>,
    pub(crate) strategy: Option<Arc<dyn ExtractStrategy>>,
    pub(crate) raise_on_http_error: bool,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("route", &self.route)
            .field("body", &self.body)
            .field("query", &self.query)
            .field("values", &self.values)
            .field("strategy", &self.strategy.as_ref().map(|s| s.name()))
            .field("raise_on_http_error", &self.raise_on_http_error)
            .finish()
    }
}

impl HttpRequest {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            body: Body::Empty,
            query: Vec::new(),
            values: HashMap::new(),
            strategy: None,
            raise_on_http_error: true,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(bytes.into());
        self
    }

    pub fn form<K: Into<String>, V: Into<String>>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self {
        self.body = Body::Form(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn zip_file(mut self, field: impl Into<String>, file_name: impl Into<String>, content: Vec<u8>) -> Self {
        self.body = Body::ZipFile {
            field: field.into(),
            file_name: file_name.into(),
            content,
        };
        self
    }

    /// Add a query string parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Supply a value for a `$(name)` variable
    pub fn value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn values(mut self, values: HashMap<String, String>) -> Self {
        self.values.extend(values);
        self
    }

    /// Decode the response with this strategy regardless of its content type
    pub fn strategy(mut self, strategy: Arc<dyn ExtractStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Treat HTTP status >= 400 as an error (default `true`)
    pub fn raise_on_http_error(mut self, raise: bool) -> Self {
        self.raise_on_http_error = raise;
        self
    }
}
