//! HTTP transport
//!
//! An [`HttpFactory`] owns the configured sessions (endpoints, in failover
//! order), the route table and the extraction pipeline. A call names a route,
//! the factory renders its `$(name)` variables, runs it against the sessions
//! through the [`FailoverExecutor`] and decodes the response by content type.
//!
//! ```text
//! HttpRequest ──► RouteTable ──► template ──► FailoverExecutor
//!                                                   │
//!                              session A ◄──────────┤ transient error
//!                              session B ◄──────────┘
//!                                   │
//!                              RawResponse ──► ExtractionPipeline ──► Payload
//! ```

pub mod curl;
pub mod request;
pub mod routing;
pub mod session;

use hubclient_core_resilience::{EndpointRegistry, FailoverExecutor, Redactor};
use reqwest::header::CONTENT_TYPE;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::error::HttpError;
use crate::extract::{ExtractionPipeline, Payload, RawResponse};
use crate::template;

pub use request::{Body, HttpRequest};
pub use routing::{Route, RouteTable};
pub use session::HttpSession;

/// Route-driven HTTP client with endpoint failover
#[derive(Debug)]
pub struct HttpFactory {
    sessions: EndpointRegistry<HttpSession>,
    routes: RouteTable,
    default_headers: BTreeMap<String, String>,
    executor: FailoverExecutor,
    pipeline: ExtractionPipeline,
    redactor: Redactor,
}

impl HttpFactory {
    pub fn new(config: &HttpConfig, redactor: Redactor) -> Result<Self, HttpError> {
        let sessions = config
            .sessions
            .iter()
            .map(HttpSession::new)
            .collect::<Result<Vec<_>, _>>()?;
        let sessions = EndpointRegistry::new(sessions)?;
        let routes = RouteTable::from_source(&config.scheme)?;

        info!(
            "HTTP factory ready: sessions [{}], {} routes",
            sessions.aliases().join(", "),
            routes.aliases().len()
        );

        Ok(Self {
            sessions,
            routes,
            default_headers: config.default_headers.clone(),
            executor: FailoverExecutor::new(config.failover.into()),
            pipeline: ExtractionPipeline::default(),
            redactor,
        })
    }

    /// Replace the content-type dispatch table
    pub fn with_pipeline(mut self, pipeline: ExtractionPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn sessions(&self) -> &EndpointRegistry<HttpSession> {
        &self.sessions
    }

    /// Execute and decode the response
    pub fn execute(&self, request: &HttpRequest) -> Result<Payload, HttpError> {
        let route = self.routes.get(request.route())?;
        let response = self.execute_raw(request)?;
        Ok(self.pipeline.extract(
            &response,
            request.strategy.as_deref(),
            route.decode.as_deref(),
        ))
    }

    /// Execute without decoding the body
    pub fn execute_raw(&self, request: &HttpRequest) -> Result<RawResponse, HttpError> {
        let route = self.routes.get(request.route())?;
        let path = template::render(&route.url, &request.values)?;

        // Route headers override defaults of the same name
        let mut headers = template::render_map(&self.default_headers, &request.values)?;
        headers.extend(template::render_map(&route.headers, &request.values)?);

        self.executor.run(&self.sessions, |session| {
            self.send(session, route, &path, &headers, request)
        })
    }

    fn send(
        &self,
        session: &HttpSession,
        route: &Route,
        path: &str,
        headers: &BTreeMap<String, String>,
        request: &HttpRequest,
    ) -> Result<RawResponse, HttpError> {
        let url = session.url(path);
        let timeout = route.timeout.unwrap_or_else(|| session.timeout());

        let mut builder = session.request(route.method.clone(), &url).timeout(timeout);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        let builder = request.body.apply(builder)?;

        debug!(
            route = %route.alias,
            "{} {} body: {}",
            route.method,
            url,
            self.redactor.redact(&request.body.describe())
        );

        let result = builder
            .send()
            .map_err(|e| HttpError::from_reqwest(&url, e))
            .and_then(|response| self.read_response(&url, response, request.raise_on_http_error));

        if let Err(ref e) = result {
            warn!(
                route = %route.alias,
                "Request failed ({}), reproduce with: {}",
                e,
                curl::curlify(
                    &route.method,
                    &url,
                    headers,
                    session.basic_auth_user(),
                    &request.query,
                    &request.body,
                )
            );
        }

        result
    }

    fn read_response(
        &self,
        url: &str,
        response: reqwest::blocking::Response,
        raise_on_http_error: bool,
    ) -> Result<RawResponse, HttpError> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .map_err(|e| HttpError::from_reqwest(url, e))?
            .to_vec();

        debug!(
            "HTTP {} from {} ({} bytes): {}",
            status,
            url,
            body.len(),
            self.redactor.redact(&String::from_utf8_lossy(&body))
        );

        if raise_on_http_error && status >= 400 {
            return Err(HttpError::Status {
                status,
                url: url.to_string(),
            });
        }

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}
