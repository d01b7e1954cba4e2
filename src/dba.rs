/*!
 * Database access layer
 *
 * Drivers are plain factories registered by name. A [`Dao`] owns the pool
 * for one configured database and hands out [`Transaction`] guards. In auto
 * mode a transaction commits when the work succeeds and rolls back when it
 * fails; the connection goes back to the pool when the guard is dropped.
 *
 * Statements go through [`Transaction::execute`], [`Transaction::execute_many`]
 * and [`Transaction::call_proc`]. Rows are column-name maps of JSON values;
 * mapping them onto application types is left to the caller.
 */

use hubclient_core_resilience::{
    ConnectionFactory, ConnectionPool, Credentials, DbError, DriverError, DriverErrorClass,
    PoolStatus, PooledConnection, PooledResource, Redactor,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::ConfigError;

/// One result row keyed by column name
pub type Row = BTreeMap<String, Value>;

pub type Rows = Vec<Row>;

/// How many rows a statement hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fetch {
    #[default]
    All,
    One,
    None,
}

impl Fetch {
    /// Trim driver output to the requested shape
    pub fn apply(self, mut rows: Rows) -> Rows {
        match self {
            Fetch::All => rows,
            Fetch::One => {
                rows.truncate(1);
                rows
            }
            Fetch::None => Vec::new(),
        }
    }
}

/// A database session as seen by the pool
pub trait Connection: PooledResource {
    /// Run one statement with positional parameters
    fn execute(&mut self, statement: &str, params: &[Value], fetch: Fetch) -> Result<Rows, DriverError>;

    /// Run one statement once per parameter set
    fn execute_many(&mut self, statement: &str, batch: &[Vec<Value>]) -> Result<(), DriverError> {
        for params in batch {
            self.execute(statement, params, Fetch::None)?;
        }
        Ok(())
    }

    fn call_proc(&mut self, name: &str, _params: &[Value], _fetch: Fetch) -> Result<Rows, DriverError> {
        Err(DriverError::new(
            DriverErrorClass::NotSupported,
            format!("stored procedures are not supported (called '{}')", name),
        ))
    }

    fn commit(&mut self) -> Result<(), DriverError>;
    fn rollback(&mut self) -> Result<(), DriverError>;
}

pub type DriverFactory = ConnectionFactory<Box<dyn Connection>>;

/// Connection factories by driver name
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, DriverFactory>,
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.drivers.keys().collect();
        names.sort();
        f.debug_struct("DriverRegistry").field("drivers", &names).finish()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; a later registration under the same name wins
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Credentials) -> Result<Box<dyn Connection>, DriverError> + Send + Sync + 'static,
    {
        self.drivers.insert(name.into(), Arc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<&DriverFactory> {
        self.drivers.get(name)
    }
}

/// Pooled access to one database
#[derive(Clone)]
pub struct Dao {
    name: String,
    pool: Arc<ConnectionPool<Box<dyn Connection>>>,
    redactor: Redactor,
}

impl fmt::Debug for Dao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dao")
            .field("name", &self.name)
            .field("status", &self.pool.status())
            .finish()
    }
}

impl Dao {
    pub fn new(name: &str, config: &DatabaseConfig, drivers: &DriverRegistry) -> Result<Self, ConfigError> {
        let factory = drivers.get(&config.driver).ok_or_else(|| ConfigError::Unknown {
            kind: "driver",
            name: config.driver.clone(),
        })?;
        let pool_config = config.pool.to_pool_config()?;

        info!(
            "Database '{}' ({}): pool size {}, max overflow {}",
            name, config.driver, pool_config.pool_size, pool_config.max_overflow
        );

        Ok(Self {
            name: name.to_string(),
            pool: Arc::new(ConnectionPool::new(
                Arc::clone(factory),
                config.credentials.clone(),
                pool_config,
            )),
            redactor: Redactor::default(),
        })
    }

    /// Cap logged statement parameters and results
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &ConnectionPool<Box<dyn Connection>> {
        &self.pool
    }

    /// Check out a connection wrapped in a transaction guard
    pub fn transaction(&self, auto: bool) -> Result<Transaction<'_>, DbError> {
        let connection = self.pool.checkout()?;
        debug!("Database '{}': transaction started (auto {})", self.name, auto);
        Ok(Transaction {
            database: &self.name,
            redactor: self.redactor,
            connection: Some(connection),
            auto,
            pending: false,
            broken: false,
        })
    }

    /// Open a connection with other credentials, outside pool accounting
    pub fn connect_as(&self, user: &str, password: &str) -> Result<Box<dyn Connection>, DbError> {
        self.pool.connect_as(user, password)
    }

    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Close idle connections
    pub fn dispose(&self) {
        self.pool.dispose();
    }
}

/// Unit of work on one pooled connection
///
/// Dropping the guard returns the connection to the pool. A connection that
/// failed with an operational error is closed instead, and uncommitted work of
/// a manual transaction is rolled back first.
pub struct Transaction<'a> {
    database: &'a str,
    redactor: Redactor,
    connection: Option<PooledConnection<'a, Box<dyn Connection>>>,
    auto: bool,
    pending: bool,
    broken: bool,
}

impl Transaction<'_> {
    pub fn is_auto(&self) -> bool {
        self.auto
    }

    /// Run work on the connection
    pub fn run<T, F>(&mut self, work: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut dyn Connection) -> Result<T, DriverError>,
    {
        let auto = self.auto;
        let conn = self.connection_mut()?;

        match work(conn) {
            Ok(value) => {
                if auto {
                    conn.commit().map_err(|e| self.fail(e))?;
                } else {
                    self.pending = true;
                }
                Ok(value)
            }
            Err(e) => {
                if auto {
                    if let Err(rollback) = conn.rollback() {
                        warn!("Rollback failed: {}", rollback);
                    }
                } else {
                    self.pending = true;
                }
                Err(self.fail(e))
            }
        }
    }

    /// Execute a statement and return the rows selected by `fetch`
    pub fn execute(&mut self, statement: &str, params: &[Value], fetch: Fetch) -> Result<Rows, DbError> {
        debug!(
            database = %self.database,
            "Execute: {} params: {}",
            statement,
            self.redactor.redact_debug(params)
        );
        let rows = self.run(|conn| conn.execute(statement, params, fetch).map(|rows| fetch.apply(rows)))?;
        self.log_rows(&rows);
        Ok(rows)
    }

    pub fn execute_many(&mut self, statement: &str, batch: &[Vec<Value>]) -> Result<(), DbError> {
        debug!(
            database = %self.database,
            "Execute many ({} sets): {} params: {}",
            batch.len(),
            statement,
            self.redactor.redact_debug(batch)
        );
        self.run(|conn| conn.execute_many(statement, batch))
    }

    /// Call a stored procedure
    pub fn call_proc(&mut self, name: &str, params: &[Value], fetch: Fetch) -> Result<Rows, DbError> {
        debug!(
            database = %self.database,
            "Call procedure: {} params: {}",
            name,
            self.redactor.redact_debug(params)
        );
        let rows = self.run(|conn| conn.call_proc(name, params, fetch).map(|rows| fetch.apply(rows)))?;
        self.log_rows(&rows);
        Ok(rows)
    }

    fn log_rows(&self, rows: &Rows) {
        let rendered = serde_json::to_string(rows).unwrap_or_default();
        debug!(
            database = %self.database,
            "Result ({} rows): {}",
            rows.len(),
            self.redactor.redact(&rendered)
        );
    }

    pub fn commit(&mut self) -> Result<(), DbError> {
        let conn = self.connection_mut()?;
        conn.commit().map_err(|e| self.fail(e))?;
        self.pending = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), DbError> {
        let conn = self.connection_mut()?;
        conn.rollback().map_err(|e| self.fail(e))?;
        self.pending = false;
        Ok(())
    }

    fn connection_mut(&mut self) -> Result<&mut dyn Connection, DbError> {
        if self.broken {
            return Err(DbError::Interface(
                "connection was closed after an operational error".to_string(),
            ));
        }
        match self.connection.as_mut() {
            Some(connection) => Ok(&mut ***connection),
            None => Err(DbError::Interface("transaction already finished".to_string())),
        }
    }

    /// Classify a driver error and remember whether the connection is unusable
    fn fail(&mut self, err: DriverError) -> DbError {
        if err.class == DriverErrorClass::Operational {
            self.broken = true;
        }
        DbError::from(err)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        if self.broken {
            if let Err(e) = connection.discard() {
                warn!("Failed to close broken connection: {}", e);
            }
            return;
        }

        if self.pending {
            debug!("Rolling back uncommitted transaction");
            if let Err(e) = connection.rollback() {
                warn!("Rollback on release failed: {}", e);
                if let Err(e) = connection.discard() {
                    warn!("Failed to close connection: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolSettings;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct MockConnection {
        id: usize,
        journal: Journal,
    }

    impl MockConnection {
        fn log(&self, event: &str) {
            self.journal.lock().unwrap().push(format!("{}:{}", event, self.id));
        }
    }

    impl PooledResource for MockConnection {
        fn close(&mut self) -> Result<(), DriverError> {
            self.log("close");
            Ok(())
        }
    }

    impl Connection for MockConnection {
        fn execute(&mut self, statement: &str, params: &[Value], _fetch: Fetch) -> Result<Rows, DriverError> {
            self.log(&format!("execute {}", statement));
            if statement.starts_with("INSERT") && params.first() == Some(&Value::Null) {
                return Err(DriverError::new(DriverErrorClass::Integrity, "receipt id is required"));
            }
            Ok((1..=3)
                .map(|n| Row::from([("n".to_string(), Value::from(n))]))
                .collect())
        }

        fn commit(&mut self) -> Result<(), DriverError> {
            self.log("commit");
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), DriverError> {
            self.log("rollback");
            Ok(())
        }
    }

    fn dao(journal: &Journal) -> Dao {
        let journal = Arc::clone(journal);
        let counter = Arc::new(Mutex::new(0));
        let mut drivers = DriverRegistry::new();
        drivers.register("mock", move |_: &Credentials| {
            let mut next = counter.lock().unwrap();
            *next += 1;
            Ok(Box::new(MockConnection {
                id: *next,
                journal: Arc::clone(&journal),
            }) as Box<dyn Connection>)
        });

        let config = DatabaseConfig {
            driver: "mock".into(),
            credentials: BTreeMap::new(),
            pool: PoolSettings {
                pool_size: 1,
                ..Default::default()
            },
        };
        Dao::new("pos", &config, &drivers).unwrap()
    }

    fn events(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[test]
    fn test_auto_commit_on_success() {
        let journal = Journal::default();
        let dao = dao(&journal);

        let value = dao.transaction(true).unwrap().run(|_conn| Ok(42)).unwrap();

        assert_eq!(value, 42);
        assert_eq!(events(&journal), vec!["commit:1"]);
        assert_eq!(dao.status().idle, 1);
    }

    #[test]
    fn test_auto_rollback_on_error() {
        let journal = Journal::default();
        let dao = dao(&journal);

        let err = dao
            .transaction(true)
            .unwrap()
            .run(|_conn| -> Result<(), _> {
                Err(DriverError::new(DriverErrorClass::Integrity, "duplicate receipt"))
            })
            .unwrap_err();

        assert!(matches!(err, DbError::Integrity(_)));
        assert_eq!(events(&journal), vec!["rollback:1"]);
        assert_eq!(dao.status().idle, 1);
    }

    #[test]
    fn test_operational_error_discards_connection() {
        crate::logging::init_test_logging();
        let journal = Journal::default();
        let dao = dao(&journal);

        {
            let mut tx = dao.transaction(true).unwrap();
            let err = tx
                .run(|_conn| -> Result<(), _> {
                    Err(DriverError::new(DriverErrorClass::Operational, "server gone away"))
                })
                .unwrap_err();
            assert!(err.is_transient());
            assert!(tx.run(|_conn| Ok(())).is_err());
        }

        assert_eq!(events(&journal), vec!["rollback:1", "close:1"]);
        assert_eq!(dao.status().idle, 0);

        // A fresh connection replaces the broken one
        dao.transaction(true).unwrap().run(|_conn| Ok(())).unwrap();
        assert!(events(&journal).contains(&"commit:2".to_string()));
    }

    #[test]
    fn test_manual_transaction() {
        let journal = Journal::default();
        let dao = dao(&journal);

        let mut tx = dao.transaction(false).unwrap();
        assert!(!tx.is_auto());
        tx.run(|_conn| Ok(())).unwrap();
        assert!(events(&journal).is_empty());
        tx.commit().unwrap();
        drop(tx);

        assert_eq!(events(&journal), vec!["commit:1"]);
    }

    #[test]
    fn test_manual_transaction_rolled_back_on_drop() {
        let journal = Journal::default();
        let dao = dao(&journal);

        {
            let mut tx = dao.transaction(false).unwrap();
            tx.run(|_conn| Ok(())).unwrap();
        }

        assert_eq!(events(&journal), vec!["rollback:1"]);
        assert_eq!(dao.status().idle, 1);
    }

    #[test]
    fn test_execute_fetch_modes() {
        crate::logging::init_test_logging();
        let journal = Journal::default();
        let dao = dao(&journal).with_redactor(Redactor::new(16));
        let mut tx = dao.transaction(false).unwrap();

        let all = tx.execute("SELECT n FROM t", &[], Fetch::All).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2]["n"], Value::from(3));

        let one = tx.execute("SELECT n FROM t", &[], Fetch::One).unwrap();
        assert_eq!(one, vec![Row::from([("n".to_string(), Value::from(1))])]);

        assert!(tx.execute("UPDATE t SET n = 0", &[], Fetch::None).unwrap().is_empty());
        tx.commit().unwrap();
        drop(tx);

        assert_eq!(
            events(&journal),
            vec![
                "execute SELECT n FROM t:1",
                "execute SELECT n FROM t:1",
                "execute UPDATE t SET n = 0:1",
                "commit:1",
            ]
        );
    }

    #[test]
    fn test_execute_auto_commit_and_rollback() {
        let journal = Journal::default();
        let dao = dao(&journal);

        dao.transaction(true)
            .unwrap()
            .execute("INSERT INTO receipts VALUES (?)", &[Value::from(7)], Fetch::None)
            .unwrap();
        let err = dao
            .transaction(true)
            .unwrap()
            .execute("INSERT INTO receipts VALUES (?)", &[Value::Null], Fetch::None)
            .unwrap_err();

        assert!(matches!(err, DbError::Integrity(_)));
        assert_eq!(
            events(&journal),
            vec![
                "execute INSERT INTO receipts VALUES (?):1",
                "commit:1",
                "execute INSERT INTO receipts VALUES (?):1",
                "rollback:1",
            ]
        );
    }

    #[test]
    fn test_execute_many_runs_every_set() {
        let journal = Journal::default();
        let dao = dao(&journal);

        let batch = vec![vec![Value::from(1)], vec![Value::from(2)]];
        dao.transaction(true)
            .unwrap()
            .execute_many("INSERT INTO receipts VALUES (?)", &batch)
            .unwrap();

        assert_eq!(
            events(&journal),
            vec![
                "execute INSERT INTO receipts VALUES (?):1",
                "execute INSERT INTO receipts VALUES (?):1",
                "commit:1",
            ]
        );
    }

    #[test]
    fn test_call_proc_unsupported_by_default() {
        let journal = Journal::default();
        let dao = dao(&journal);

        let err = dao
            .transaction(true)
            .unwrap()
            .call_proc("close_shift", &[Value::from(7)], Fetch::All)
            .unwrap_err();

        assert!(matches!(err, DbError::NotSupported(_)));
        assert_eq!(events(&journal), vec!["rollback:1"]);
    }

    #[test]
    fn test_unknown_driver() {
        let config = DatabaseConfig {
            driver: "oracle".into(),
            credentials: BTreeMap::new(),
            pool: PoolSettings::default(),
        };
        let err = Dao::new("pos", &config, &DriverRegistry::new()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown driver 'oracle'");
    }

    #[test]
    fn test_dispose_closes_idle() {
        let journal = Journal::default();
        let dao = dao(&journal);
        dao.transaction(true).unwrap().run(|_conn| Ok(())).unwrap();

        dao.dispose();

        assert_eq!(events(&journal), vec!["commit:1", "close:1"]);
        assert_eq!(dao.status().idle, 0);
    }
}
