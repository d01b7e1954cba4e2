//! gRPC transport
//!
//! Channels are created lazily from configuration and reused for every call.
//! Generated stubs stay with the caller: [`GrpcFactory::execute`] hands each
//! attempt a [`GrpcCall`] carrying the channel of the current endpoint, and
//! the caller builds its client on top of it.
//!
//! ```no_run
//! # use hubclient::grpc::GrpcFactory;
//! # async fn demo(factory: &GrpcFactory) -> Result<(), hubclient::error::GrpcError> {
//! let ping = "ping".to_string();
//! let reply: String = factory
//!     .execute("Health", "Check", &ping, |call| async move {
//!         let _request = call.request(());
//!         // StoreClient::new(call.channel).check(_request).await ...
//!         Ok::<_, tonic::Status>(format!("pong from {}", call.alias))
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use hubclient_core_resilience::{Endpoint, EndpointRegistry, FailoverExecutor, Redactor, RegistryError};
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::transport::{Certificate, Channel, ClientTlsConfig};
use tracing::{debug, error, info};

use crate::config::{GrpcChannelConfig, GrpcConfig};
use crate::error::GrpcError;

/// One configured gRPC endpoint
#[derive(Debug, Clone)]
pub struct GrpcChannel {
    alias: String,
    url: String,
    timeout: Duration,
    metadata: Vec<(AsciiMetadataKey, AsciiMetadataValue)>,
    channel: Channel,
}

impl GrpcChannel {
    /// Build a lazily connecting channel; must run inside a tokio runtime
    pub fn new(config: &GrpcChannelConfig) -> Result<Self, GrpcError> {
        if config.url.trim().is_empty() {
            return Err(RegistryError::Invalid {
                alias: config.alias.clone(),
                reason: "url is required".to_string(),
            }
            .into());
        }

        let invalid_url = |reason: String| GrpcError::InvalidUrl {
            url: config.url.clone(),
            reason,
        };

        let mut endpoint = tonic::transport::Endpoint::from_shared(config.url.clone())
            .map_err(|e| invalid_url(e.to_string()))?;

        let timeout = Duration::from_secs(config.timeout_secs);
        endpoint = endpoint.timeout(timeout).connect_timeout(timeout);

        if let Some(ref path) = config.verify {
            match std::fs::read(path) {
                Ok(pem) => {
                    let tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
                    endpoint = endpoint.tls_config(tls).map_err(|e| invalid_url(e.to_string()))?;
                }
                Err(e) => {
                    error!(
                        alias = %config.alias,
                        "Cannot read certificate {}: {}; using an insecure channel",
                        path.display(),
                        e
                    );
                }
            }
        }

        let metadata = config
            .metadata
            .iter()
            .map(|(key, value)| parse_metadata(&config.alias, key, value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            alias: config.alias.clone(),
            url: config.url.clone(),
            timeout,
            metadata,
            channel: endpoint.connect_lazy(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Handle for a single attempt
    pub fn call(&self) -> GrpcCall {
        GrpcCall {
            alias: self.alias.clone(),
            channel: self.channel.clone(),
            metadata: self.metadata.clone(),
            timeout: self.timeout,
        }
    }
}

impl Endpoint for GrpcChannel {
    const KIND: &'static str = "grpc";

    fn alias(&self) -> &str {
        &self.alias
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.url.is_empty() {
            return Err(RegistryError::Invalid {
                alias: self.alias.clone(),
                reason: "url is required".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_metadata(
    alias: &str,
    key: &str,
    value: &str,
) -> Result<(AsciiMetadataKey, AsciiMetadataValue), GrpcError> {
    let key_parsed = AsciiMetadataKey::from_bytes(key.as_bytes())
        .map_err(|e| GrpcError::Config(format!("channel '{}': metadata key '{}': {}", alias, key, e)))?;
    let value_parsed = AsciiMetadataValue::try_from(value)
        .map_err(|e| GrpcError::Config(format!("channel '{}': metadata '{}': {}", alias, key, e)))?;
    Ok((key_parsed, value_parsed))
}

/// Everything one attempt needs to issue a call
#[derive(Debug, Clone)]
pub struct GrpcCall {
    pub alias: String,
    pub channel: Channel,
    metadata: Vec<(AsciiMetadataKey, AsciiMetadataValue)>,
    timeout: Duration,
}

impl GrpcCall {
    /// Wrap a message with the channel metadata and timeout
    pub fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        for (key, value) in &self.metadata {
            request.metadata_mut().insert(key.clone(), value.clone());
        }
        request.set_timeout(self.timeout);
        request
    }
}

/// gRPC client with channel failover
#[derive(Debug)]
pub struct GrpcFactory {
    channels: EndpointRegistry<GrpcChannel>,
    executor: FailoverExecutor,
    redactor: Redactor,
}

impl GrpcFactory {
    /// Build every channel inside the given runtime
    pub fn new(config: &GrpcConfig, redactor: Redactor, handle: &Handle) -> Result<Self, GrpcError> {
        let _guard = handle.enter();

        let channels = config
            .channels
            .iter()
            .map(GrpcChannel::new)
            .collect::<Result<Vec<_>, _>>()?;
        let channels = EndpointRegistry::new(channels)?;

        info!("gRPC factory ready: channels [{}]", channels.aliases().join(", "));

        Ok(Self {
            channels,
            executor: FailoverExecutor::new(config.failover.into()),
            redactor,
        })
    }

    pub fn channels(&self) -> &EndpointRegistry<GrpcChannel> {
        &self.channels
    }

    /// Run one call against the channels in failover order
    ///
    /// `service` and `method` only name the call in logs.
    pub async fn execute<Q, T, F, Fut>(
        &self,
        service: &str,
        method: &str,
        request: &Q,
        mut call: F,
    ) -> Result<T, GrpcError>
    where
        Q: Debug + ?Sized,
        T: Debug,
        F: FnMut(GrpcCall) -> Fut,
        Fut: Future<Output = Result<T, tonic::Status>>,
    {
        debug!(
            "gRPC {}/{} request: {}",
            service,
            method,
            self.redactor.redact_debug(request)
        );

        let response = self
            .executor
            .run_async(&self.channels, |channel| {
                let attempt = call(channel.call());
                async move { attempt.await.map_err(GrpcError::Status) }
            })
            .await?;

        debug!(
            "gRPC {}/{} response: {}",
            service,
            method,
            self.redactor.redact_debug(&response)
        );
        Ok(response)
    }
}
