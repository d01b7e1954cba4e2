//! Generic blocking pool for expensive-to-create resources
//!
//! The pool keeps at most `pool_size` idle resources and lets up to
//! `max_overflow` additional resources exist beyond that. Accounting uses a
//! signed overflow counter that starts at `-pool_size`:
//!
//! ```text
//! overflow    = live resources - pool_size
//! checked_out = pool_size - idle + overflow
//! ```
//!
//! The counter has its own mutex, held only for the increment or decrement.
//! Idle resources live in a queue guarded by a second mutex whose condition
//! variable is the blocking primitive for `acquire` once the overflow limit is
//! reached. The two locks are always taken idle-queue first.

use crate::error::{DbError, DriverError, DriverErrorClass};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Opaque connection parameters handed to the factory (dsn, user, password...)
pub type Credentials = BTreeMap<String, String>;

/// Builds a new resource from credentials
pub type ConnectionFactory<R> = Arc<dyn Fn(&Credentials) -> Result<R, DriverError> + Send + Sync>;

/// `max_overflow` value that disables the overflow ceiling
pub const UNLIMITED_OVERFLOW: isize = -1;

/// A resource that can live in a [`ConnectionPool`]
pub trait PooledResource: Send {
    /// Close the underlying resource
    fn close(&mut self) -> Result<(), DriverError>;
}

impl<T: PooledResource + ?Sized> PooledResource for Box<T> {
    fn close(&mut self) -> Result<(), DriverError> {
        (**self).close()
    }
}

/// Capability: hand out a resource
pub trait Acquirable<R> {
    fn acquire(&self) -> Result<R, DbError>;
}

/// Capability: take a resource back
pub trait Releasable<R> {
    fn release(&self, resource: R) -> Result<(), DbError>;
}

/// Capability: free everything the owner still holds
pub trait Disposable {
    fn dispose(&self);
}

/// Configuration for connection pool behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept for reuse
    pub pool_size: usize,
    /// Connections allowed beyond `pool_size` (`-1` = unlimited)
    pub max_overflow: isize,
    /// How long `acquire` waits once the overflow limit is reached.
    /// `Duration::ZERO` fails fast with [`DbError::Overflow`].
    pub timeout: Duration,
    /// Hand out the most recently returned connection first
    pub use_lifo: bool,
    /// Driver error classes swallowed (and logged) when closing a connection
    pub suppressed: Vec<DriverErrorClass>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            max_overflow: 10,
            timeout: Duration::from_secs(30),
            use_lifo: false,
            suppressed: Vec::new(),
        }
    }
}

impl PoolConfig {
    pub fn unlimited_overflow(&self) -> bool {
        self.max_overflow < 0
    }

    /// Upper bound on simultaneously checked-out connections, `None` if unbounded
    pub fn max_checked_out(&self) -> Option<usize> {
        if self.unlimited_overflow() {
            None
        } else {
            Some(self.pool_size + self.max_overflow as usize)
        }
    }
}

/// Bounded FIFO/LIFO store of idle resources
struct IdleQueue<R> {
    items: VecDeque<R>,
    capacity: usize,
    lifo: bool,
}

impl<R> IdleQueue<R> {
    fn new(capacity: usize, lifo: bool) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            lifo,
        }
    }

    fn pop(&mut self) -> Option<R> {
        if self.lifo {
            self.items.pop_back()
        } else {
            self.items.pop_front()
        }
    }

    /// Push unless full, handing the resource back when there is no room
    fn try_push(&mut self, resource: R) -> Result<(), R> {
        if self.items.len() >= self.capacity {
            return Err(resource);
        }
        self.items.push_back(resource);
        Ok(())
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Snapshot of pool accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub idle: usize,
    pub overflow: isize,
    pub checked_out: isize,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool size: {}  Connections in pool: {} Current overflow: {} Current checked out connections: {}",
            self.size, self.idle, self.overflow, self.checked_out
        )
    }
}

/// A generic blocking connection pool
///
/// # Example
/// ```
/// use hubclient_core_resilience::{ConnectionPool, Credentials, DriverError, PoolConfig, PooledResource};
/// use std::sync::Arc;
///
/// struct Conn;
///
/// impl PooledResource for Conn {
///     fn close(&mut self) -> Result<(), DriverError> {
///         Ok(())
///     }
/// }
///
/// let pool = ConnectionPool::new(
///     Arc::new(|_: &Credentials| Ok(Conn)),
///     Credentials::new(),
///     PoolConfig::default(),
/// );
///
/// let conn = pool.acquire().unwrap();
/// pool.release(conn).unwrap();
/// assert_eq!(pool.status().idle, 1);
/// ```
pub struct ConnectionPool<R> {
    config: PoolConfig,
    factory: ConnectionFactory<R>,
    credentials: Credentials,
    idle: Mutex<IdleQueue<R>>,
    available: Condvar,
    overflow: Mutex<isize>,
}

impl<R: PooledResource> ConnectionPool<R> {
    /// Create a new connection pool. No connection is opened until the first acquire.
    pub fn new(factory: ConnectionFactory<R>, credentials: Credentials, config: PoolConfig) -> Self {
        let idle = IdleQueue::new(config.pool_size, config.use_lifo);
        let overflow = -(config.pool_size as isize);
        Self {
            config,
            factory,
            credentials,
            idle: Mutex::new(idle),
            available: Condvar::new(),
            overflow: Mutex::new(overflow),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Acquire a connection from the pool
    ///
    /// Reuses an idle connection when one exists, otherwise opens a new one if
    /// the overflow limit allows it. At the limit the call blocks until a
    /// connection is released or `timeout` elapses. A timeout too large to
    /// form a deadline waits indefinitely.
    pub fn acquire(&self) -> Result<R, DbError> {
        let deadline = Instant::now().checked_add(self.config.timeout);
        let mut idle = self.idle.lock();

        loop {
            if let Some(resource) = idle.pop() {
                trace!("Reusing idle connection ({} left)", idle.len());
                return Ok(resource);
            }

            if self.inc_overflow() {
                drop(idle);
                return self.create();
            }

            if self.config.timeout.is_zero() {
                return Err(DbError::Overflow {
                    pool_size: self.config.pool_size,
                    max_overflow: self.config.max_overflow,
                });
            }

            let timed_out = match deadline {
                Some(deadline) => {
                    debug!(
                        "Connection pool exhausted, waiting up to {:?}",
                        deadline.saturating_duration_since(Instant::now())
                    );
                    self.available.wait_until(&mut idle, deadline).timed_out()
                }
                None => {
                    debug!("Connection pool exhausted, waiting for a release");
                    self.available.wait(&mut idle);
                    false
                }
            };
            if timed_out {
                if let Some(resource) = idle.pop() {
                    return Ok(resource);
                }
                if self.inc_overflow() {
                    drop(idle);
                    return self.create();
                }
                warn!("Timed out waiting for a pooled connection");
                return Err(DbError::Timeout(self.config.timeout));
            }
        }
    }

    /// Return a connection to the pool
    ///
    /// The connection is kept for reuse if the idle queue has room. Otherwise it
    /// is closed and the overflow counter decremented; close failures in the
    /// suppressed set are logged and swallowed, others are classified and returned.
    pub fn release(&self, resource: R) -> Result<(), DbError> {
        let resource = {
            let mut idle = self.idle.lock();
            match idle.try_push(resource) {
                Ok(()) => {
                    self.available.notify_one();
                    return Ok(());
                }
                Err(resource) => resource,
            }
        };

        self.destroy(resource)
    }

    /// Close a connection that must not be reused (e.g. after a lost link)
    pub fn discard(&self, resource: R) -> Result<(), DbError> {
        self.destroy(resource)
    }

    /// Close every idle connection and reset accounting
    pub fn dispose(&self) {
        let drained: Vec<R> = {
            let mut idle = self.idle.lock();
            idle.items.drain(..).collect()
        };

        debug!("Disposing connection pool ({} idle)", drained.len());
        for mut resource in drained {
            if let Err(e) = resource.close() {
                warn!("Failed to close idle connection during dispose: {}", e);
            }
        }

        *self.overflow.lock() = -(self.config.pool_size as isize);
        self.available.notify_all();
    }

    /// Open a connection outside pool accounting, overriding user and password
    pub fn connect_as(&self, user: &str, password: &str) -> Result<R, DbError> {
        let mut credentials = self.credentials.clone();
        credentials.insert("user".to_string(), user.to_string());
        credentials.insert("password".to_string(), password.to_string());
        (self.factory)(&credentials).map_err(DbError::from)
    }

    /// Acquire a connection wrapped in a guard that releases it on drop
    pub fn checkout(&self) -> Result<PooledConnection<'_, R>, DbError> {
        let resource = self.acquire()?;
        Ok(PooledConnection {
            pool: self,
            resource: Some(resource),
        })
    }

    /// Get current pool statistics
    pub fn status(&self) -> PoolStatus {
        let idle = self.idle.lock().len();
        let overflow = *self.overflow.lock();
        PoolStatus {
            size: self.config.pool_size,
            idle,
            overflow,
            checked_out: self.config.pool_size as isize - idle as isize + overflow,
        }
    }

    pub fn size(&self) -> usize {
        self.config.pool_size
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    fn create(&self) -> Result<R, DbError> {
        match (self.factory)(&self.credentials) {
            Ok(resource) => {
                debug!("Opened new pooled connection ({})", self.status());
                Ok(resource)
            }
            Err(e) => {
                self.dec_overflow();
                warn!("Failed to open connection: {}", e);
                Err(e.into())
            }
        }
    }

    fn destroy(&self, mut resource: R) -> Result<(), DbError> {
        let closed = resource.close();
        drop(resource);
        self.dec_overflow();

        match closed {
            Ok(()) => Ok(()),
            Err(e) if self.config.suppressed.contains(&e.class) => {
                warn!("Ignored error while closing connection: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn inc_overflow(&self) -> bool {
        let mut overflow = self.overflow.lock();
        if self.config.unlimited_overflow() || *overflow < self.config.max_overflow {
            *overflow += 1;
            true
        } else {
            false
        }
    }

    fn dec_overflow(&self) {
        {
            let mut overflow = self.overflow.lock();
            *overflow -= 1;
        }
        // Capacity freed: wake waiters so they can open a connection themselves.
        let _idle = self.idle.lock();
        self.available.notify_all();
    }
}

impl<R: PooledResource> Acquirable<R> for ConnectionPool<R> {
    fn acquire(&self) -> Result<R, DbError> {
        ConnectionPool::acquire(self)
    }
}

impl<R: PooledResource> Releasable<R> for ConnectionPool<R> {
    fn release(&self, resource: R) -> Result<(), DbError> {
        ConnectionPool::release(self, resource)
    }
}

impl<R: PooledResource> Disposable for ConnectionPool<R> {
    fn dispose(&self) {
        ConnectionPool::dispose(self)
    }
}

/// Checked-out connection returned to its pool when dropped
pub struct PooledConnection<'a, R: PooledResource> {
    pool: &'a ConnectionPool<R>,
    resource: Option<R>,
}

impl<R: PooledResource> PooledConnection<'_, R> {
    /// Release explicitly, surfacing close errors instead of logging them
    pub fn release(mut self) -> Result<(), DbError> {
        match self.resource.take() {
            Some(resource) => self.pool.release(resource),
            None => Ok(()),
        }
    }

    /// Close the connection instead of returning it for reuse
    pub fn discard(mut self) -> Result<(), DbError> {
        match self.resource.take() {
            Some(resource) => self.pool.discard(resource),
            None => Ok(()),
        }
    }
}

impl<R: PooledResource> Deref for PooledConnection<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        // Only `release`/`discard` take the resource and they consume the guard.
        self.resource.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<R: PooledResource> DerefMut for PooledConnection<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.resource.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<R: PooledResource> Drop for PooledConnection<'_, R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            if let Err(e) = self.pool.release(resource) {
                warn!("Failed to release pooled connection: {}", e);
            }
        }
    }
}
