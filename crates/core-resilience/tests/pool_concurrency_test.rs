//! Connection Pool Concurrency Test
//!
//! Many worker threads hammer a small pool with acquire/release pairs. The pool
//! must never hand out more than `pool_size + max_overflow` connections at once,
//! and every counter must be back at its resting value when the workers finish.

use hubclient_core_resilience::{
    ConnectionFactory, ConnectionPool, Credentials, DbError, DriverError, PoolConfig,
    PooledResource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Tracks how many connections are live and checked out at the same time
struct Gauge {
    in_use: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Gauge {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        })
    }

    fn enter(&self) {
        let now = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockConnection {
    gauge: Arc<Gauge>,
}

impl PooledResource for MockConnection {
    fn close(&mut self) -> Result<(), DriverError> {
        self.gauge.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn build_pool(config: PoolConfig, gauge: &Arc<Gauge>) -> Arc<ConnectionPool<MockConnection>> {
    let factory_gauge = gauge.clone();
    let factory: ConnectionFactory<MockConnection> = Arc::new(move |_: &Credentials| {
        factory_gauge.opened.fetch_add(1, Ordering::SeqCst);
        // Simulate a slow handshake outside the pool locks
        thread::sleep(Duration::from_millis(2));
        Ok(MockConnection {
            gauge: factory_gauge.clone(),
        })
    });
    Arc::new(ConnectionPool::new(factory, Credentials::new(), config))
}

fn hammer(pool: &Arc<ConnectionPool<MockConnection>>, gauge: &Arc<Gauge>, workers: usize, rounds: usize) -> Vec<DbError> {
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let pool = pool.clone();
            let gauge = gauge.clone();
            thread::spawn(move || {
                let mut errors = Vec::new();
                for _ in 0..rounds {
                    match pool.acquire() {
                        Ok(conn) => {
                            gauge.enter();
                            let status = pool.status();
                            assert!(status.checked_out >= 1);
                            thread::sleep(Duration::from_millis(1));
                            gauge.leave();
                            if let Err(e) = pool.release(conn) {
                                errors.push(e);
                            }
                        }
                        Err(e) => errors.push(e),
                    }
                }
                errors
            })
        })
        .collect();

    handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect()
}

#[test]
fn test_checked_out_never_exceeds_bound() {
    let gauge = Gauge::new();
    let config = PoolConfig {
        pool_size: 3,
        max_overflow: 2,
        timeout: Duration::from_secs(10),
        ..Default::default()
    };
    let pool = build_pool(config, &gauge);

    let errors = hammer(&pool, &gauge, 16, 25);

    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert!(
        gauge.peak.load(Ordering::SeqCst) <= 5,
        "peak {} exceeded pool_size + max_overflow",
        gauge.peak.load(Ordering::SeqCst)
    );
    assert!(gauge.opened.load(Ordering::SeqCst) <= 5 + gauge.closed.load(Ordering::SeqCst));

    let status = pool.status();
    assert_eq!(status.checked_out, 0);
    assert!(status.idle <= 3);
    assert_eq!(
        gauge.opened.load(Ordering::SeqCst) - gauge.closed.load(Ordering::SeqCst),
        status.idle
    );
}

#[test]
fn test_fail_fast_pool_reports_overflow_under_contention() {
    let gauge = Gauge::new();
    let config = PoolConfig {
        pool_size: 1,
        max_overflow: 0,
        timeout: Duration::ZERO,
        ..Default::default()
    };
    let pool = build_pool(config, &gauge);

    let errors = hammer(&pool, &gauge, 8, 10);

    assert!(errors.iter().all(|e| matches!(e, DbError::Overflow { .. })));
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
    assert_eq!(pool.status().checked_out, 0);
}

#[test]
fn test_dispose_after_load_resets_pool() {
    let gauge = Gauge::new();
    let pool = build_pool(PoolConfig::default(), &gauge);

    hammer(&pool, &gauge, 8, 5);
    let idle_before = pool.status().idle;
    let closed_before = gauge.closed.load(Ordering::SeqCst);

    pool.dispose();

    let status = pool.status();
    assert_eq!(status.idle, 0);
    assert_eq!(status.overflow, -5);
    assert_eq!(gauge.closed.load(Ordering::SeqCst), closed_before + idle_before);
}
