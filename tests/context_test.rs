use hubclient::config::AppConfig;
use hubclient::dba::{Connection, DriverRegistry, Fetch, Row, Rows};
use hubclient::error::{ClientError, ConfigError, EXIT_CONFIG};
use hubclient::resilience::{Credentials, DriverError, PooledResource};
use hubclient::AppContext;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::runtime::Runtime;

const CONFIG: &str = r#"
application = "till-sync"

[limits]
max_log_length = 2000

[database.pos]
driver = "memory"
credentials = { path = ":memory:" }

[database.pos.pool]
pool_size = 2
max_overflow = 0
timeout_secs = 0

[transport.hub]
kind = "http"
failover = "all"
sessions = [
    { alias = "primary", host = "http://127.0.0.1", port = 9 },
]
scheme = { paths = [{ alias = "ping", url = "api/ping" }] }

[transport.mail]
kind = "smtp"
sessions = [{ alias = "relay", host = "127.0.0.1", port = 2525 }]

[transport.stream]
kind = "grpc"
channels = [{ alias = "central", url = "http://127.0.0.1:50051", metadata = { x-store = "0042" } }]
"#;

struct MemoryConnection {
    closed: Arc<AtomicUsize>,
}

impl PooledResource for MemoryConnection {
    fn close(&mut self) -> Result<(), DriverError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, _statement: &str, params: &[Value], _fetch: Fetch) -> Result<Rows, DriverError> {
        Ok(vec![Row::from([("echo".to_string(), Value::from(params.to_vec()))])])
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

fn load(contents: &str) -> AppConfig {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    AppConfig::from_file(file.path()).unwrap()
}

fn drivers(closed: &Arc<AtomicUsize>) -> DriverRegistry {
    let closed = Arc::clone(closed);
    let mut drivers = DriverRegistry::new();
    drivers.register("memory", move |credentials: &Credentials| {
        assert_eq!(credentials["path"], ":memory:");
        Ok(Box::new(MemoryConnection {
            closed: Arc::clone(&closed),
        }) as Box<dyn Connection>)
    });
    drivers
}

#[test]
fn test_build_and_lookup() {
    let runtime = Runtime::new().unwrap();
    let closed = Arc::new(AtomicUsize::new(0));
    let context = AppContext::build(&load(CONFIG), &drivers(&closed), runtime.handle()).unwrap();

    assert_eq!(context.application(), "till-sync");
    assert_eq!(context.redactor().max_length(), 2000);
    assert_eq!(context.transports(), vec!["hub", "mail", "stream"]);

    assert_eq!(context.http("hub").unwrap().routes().aliases(), vec!["ping"]);
    assert_eq!(context.smtp("mail").unwrap().sessions().len(), 1);
    assert_eq!(context.grpc("stream").unwrap().channels().primary().url(), "http://127.0.0.1:50051");

    let dao = context.database("pos").unwrap();
    let rows = dao
        .transaction(true)
        .unwrap()
        .execute("SELECT ?", &[json!("0042")], Fetch::One)
        .unwrap();
    assert_eq!(rows[0]["echo"], json!(["0042"]));
    assert_eq!(dao.status().idle, 1);

    context.shutdown();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_names_and_wrong_kinds() {
    let runtime = Runtime::new().unwrap();
    let closed = Arc::new(AtomicUsize::new(0));
    let context = AppContext::build(&load(CONFIG), &drivers(&closed), runtime.handle()).unwrap();

    let err = context.http("billing").unwrap_err();
    assert!(matches!(err, ClientError::Config(ConfigError::Unknown { kind: "transport", .. })));
    assert_eq!(err.exit_code(), EXIT_CONFIG);

    let err = context.http("mail").unwrap_err();
    assert_eq!(err.to_string(), "Transport 'mail' is not a http transport");

    assert!(context.database("inventory").is_err());
}

#[test]
fn test_fail_fast_pool_from_config() {
    let runtime = Runtime::new().unwrap();
    let closed = Arc::new(AtomicUsize::new(0));
    let context = AppContext::build(&load(CONFIG), &drivers(&closed), runtime.handle()).unwrap();
    let dao = context.database("pos").unwrap();

    let _first = dao.transaction(true).unwrap();
    let _second = dao.transaction(true).unwrap();
    let err = dao.transaction(true).err().unwrap();

    assert!(err.is_transient());
    assert!(err.to_string().contains("overflow"));
}

#[test]
fn test_missing_driver_is_config_error() {
    let runtime = Runtime::new().unwrap();
    let err = AppContext::build(&load(CONFIG), &DriverRegistry::new(), runtime.handle()).unwrap_err();
    assert_eq!(err.to_string(), "Unknown driver 'memory'");
    assert_eq!(err.exit_code(), EXIT_CONFIG);
}
