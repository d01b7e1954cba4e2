//! Sequential failover across redundant endpoints
//!
//! The executor runs one logical operation against the endpoints of a registry
//! in priority order and stops at the first success. What happens on failure is
//! decided by the [`FailoverPolicy`]:
//!
//! - `TransientOnly` moves on only for errors whose [`Transient::is_transient`]
//!   is true and returns anything else immediately.
//! - `AllErrors` moves on regardless of the error kind.
//!
//! Either way the error from the last attempted endpoint is returned unchanged
//! once the registry is exhausted.

use crate::endpoint::{Endpoint, EndpointRegistry};
use crate::error::DbError;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Errors that know whether another endpoint might succeed
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for DbError {
    fn is_transient(&self) -> bool {
        DbError::is_transient(self)
    }
}

/// Which failures move execution to the next endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailoverPolicy {
    /// Fail over on network, connection and timeout errors only
    #[default]
    TransientOnly,
    /// Fail over on every error
    AllErrors,
}

impl FailoverPolicy {
    pub fn should_failover<Err: Transient>(&self, err: &Err) -> bool {
        match self {
            FailoverPolicy::TransientOnly => err.is_transient(),
            FailoverPolicy::AllErrors => true,
        }
    }
}

/// What to do after a failed attempt
enum Next<'a, E> {
    Retry(&'a E),
    GiveUp,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FailoverExecutor {
    policy: FailoverPolicy,
}

impl FailoverExecutor {
    pub fn new(policy: FailoverPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FailoverPolicy {
        self.policy
    }

    /// Run a blocking operation with failover
    pub fn run<E, T, Err, F>(&self, registry: &EndpointRegistry<E>, mut operation: F) -> Result<T, Err>
    where
        E: Endpoint,
        Err: Transient + Display,
        F: FnMut(&E) -> Result<T, Err>,
    {
        let mut attempt = 1;
        let mut endpoint = registry.primary();

        loop {
            log_attempt(endpoint, attempt, registry.len());
            let err = match operation(endpoint) {
                Ok(value) => {
                    log_success(endpoint, attempt);
                    return Ok(value);
                }
                Err(err) => err,
            };

            match self.next_endpoint(registry, endpoint, attempt, &err) {
                Next::Retry(next) => {
                    endpoint = next;
                    attempt += 1;
                }
                Next::GiveUp => return Err(err),
            }
        }
    }

    /// Run an async operation with failover
    ///
    /// The future must not borrow the endpoint; clone what it needs (a channel,
    /// a client) inside the closure.
    pub async fn run_async<E, T, Err, F, Fut>(
        &self,
        registry: &EndpointRegistry<E>,
        mut operation: F,
    ) -> Result<T, Err>
    where
        E: Endpoint,
        Err: Transient + Display,
        F: FnMut(&E) -> Fut,
        Fut: Future<Output = Result<T, Err>>,
    {
        let mut attempt = 1;
        let mut endpoint = registry.primary();

        loop {
            log_attempt(endpoint, attempt, registry.len());
            let err = match operation(endpoint).await {
                Ok(value) => {
                    log_success(endpoint, attempt);
                    return Ok(value);
                }
                Err(err) => err,
            };

            match self.next_endpoint(registry, endpoint, attempt, &err) {
                Next::Retry(next) => {
                    endpoint = next;
                    attempt += 1;
                }
                Next::GiveUp => return Err(err),
            }
        }
    }

    fn next_endpoint<'a, E, Err>(
        &self,
        registry: &'a EndpointRegistry<E>,
        failed: &E,
        attempt: usize,
        err: &Err,
    ) -> Next<'a, E>
    where
        E: Endpoint,
        Err: Transient + Display,
    {
        let Some(next) = registry.nth(attempt) else {
            error!(
                kind = E::KIND,
                alias = failed.alias(),
                attempts = attempt,
                "All endpoints failed, last error: {}",
                err
            );
            return Next::GiveUp;
        };

        if !self.policy.should_failover(err) {
            warn!(
                kind = E::KIND,
                alias = failed.alias(),
                "Non-transient error, not failing over: {}",
                err
            );
            return Next::GiveUp;
        }

        warn!(
            kind = E::KIND,
            alias = failed.alias(),
            next = next.alias(),
            "Attempt {} failed, failing over: {}",
            attempt,
            err
        );
        Next::Retry(next)
    }
}

fn log_attempt<E: Endpoint>(endpoint: &E, attempt: usize, total: usize) {
    debug!(
        kind = E::KIND,
        alias = endpoint.alias(),
        "Attempt {}/{}",
        attempt,
        total
    );
}

fn log_success<E: Endpoint>(endpoint: &E, attempt: usize) {
    if attempt > 1 {
        info!(
            kind = E::KIND,
            alias = endpoint.alias(),
            "Succeeded after {} attempts",
            attempt
        );
    }
}
