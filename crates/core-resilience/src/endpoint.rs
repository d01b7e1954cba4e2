//! Ordered registry of equivalent endpoints
//!
//! An endpoint is anything a transport can talk to: an HTTP session, a gRPC
//! channel, an SMTP relay. The registry validates every entry once at
//! construction and is immutable afterwards. Order is failover priority.

use crate::error::RegistryError;
use std::collections::HashSet;

/// A single configured endpoint
pub trait Endpoint {
    /// Human-readable endpoint family used in errors and logs ("http", "grpc"...)
    const KIND: &'static str;

    /// Configured alias, unique within a registry
    fn alias(&self) -> &str;

    /// Check required fields. Called once by [`EndpointRegistry::new`].
    fn validate(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Non-empty, ordered, validated collection of endpoints
#[derive(Debug, Clone)]
pub struct EndpointRegistry<E> {
    endpoints: Vec<E>,
}

impl<E: Endpoint> EndpointRegistry<E> {
    /// Validate and freeze a list of endpoints
    ///
    /// Fails on an empty list, on the first invalid endpoint, or when two
    /// aliases collide (case-insensitively).
    pub fn new(endpoints: Vec<E>) -> Result<Self, RegistryError> {
        if endpoints.is_empty() {
            return Err(RegistryError::Empty { kind: E::KIND });
        }

        let mut seen = HashSet::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            endpoint.validate()?;
            if !seen.insert(endpoint.alias().to_lowercase()) {
                return Err(RegistryError::DuplicateAlias(endpoint.alias().to_string()));
            }
        }

        Ok(Self { endpoints })
    }

    /// Highest priority endpoint
    pub fn primary(&self) -> &E {
        // Non-empty by construction.
        &self.endpoints[0]
    }

    /// Endpoint at a failover position (0 = primary)
    pub fn nth(&self, index: usize) -> Option<&E> {
        self.endpoints.get(index)
    }

    pub fn get(&self, alias: &str) -> Option<&E> {
        self.endpoints
            .iter()
            .find(|e| e.alias().eq_ignore_ascii_case(alias))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.endpoints.iter()
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.endpoints.iter().map(Endpoint::alias).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl<'a, E> IntoIterator for &'a EndpointRegistry<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}
