/*!
 * hubclient CLI
 *
 * Validates a configuration file and runs single HTTP calls against the
 * configured transports.
 */

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use hubclient::{
    config::{AppConfig, LogLevel, TransportConfig, CONFIG_ENV},
    error::{ClientError, ConfigError, EXIT_FAILURE, EXIT_SUCCESS},
    grpc::GrpcFactory,
    http::{HttpFactory, HttpRequest},
    logging,
    resilience::Redactor,
    smtp::SmtpFactory,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hubclient")]
#[command(version, about = "Call hub services through configured, failover-aware transports", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', env = CONFIG_ENV, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and construct every HTTP, gRPC and SMTP transport
    Check,

    /// Execute one route and print the decoded payload as JSON
    Call {
        /// Name of an HTTP transport
        transport: String,

        /// Route alias
        route: String,

        /// Template value, repeatable
        #[arg(long = "value", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        values: Vec<(String, String)>,

        /// Query parameter, repeatable
        #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        query: Vec<(String, String)>,

        /// JSON request body
        #[arg(long, value_name = "BODY")]
        json: Option<String>,

        /// Decode error responses instead of failing on HTTP status >= 400
        #[arg(long)]
        no_raise: bool,
    },

    /// List route aliases of an HTTP transport
    Routes {
        /// Name of an HTTP transport
        transport: String,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<ClientError>()
                .map(ClientError::exit_code)
                .unwrap_or(EXIT_FAILURE)
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.ok_or_else(|| {
        ClientError::from(ConfigError::Invalid(format!(
            "no configuration file, pass --config or set {}",
            CONFIG_ENV
        )))
    })?;
    let mut config = AppConfig::from_file(&config_path).map_err(ClientError::from)?;

    if let Some(level) = cli.log_level {
        config.logging.level = level.into();
    }
    config.logging.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config.logging) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Check => check(&config),
        Commands::Call {
            transport,
            route,
            values,
            query,
            json,
            no_raise,
        } => {
            let factory = http_factory(&config, &transport)?;

            let mut request = HttpRequest::new(route).raise_on_http_error(!no_raise);
            for (key, value) in values {
                request = request.value(key, value);
            }
            for (key, value) in query {
                request = request.query(key, value);
            }
            if let Some(body) = json {
                let body = serde_json::from_str(&body).context("--json is not valid JSON")?;
                request = request.json(body);
            }

            let payload = factory.execute(&request).map_err(ClientError::from)?;
            println!("{}", serde_json::to_string_pretty(&payload.to_json())?);
            Ok(())
        }
        Commands::Routes { transport } => {
            let factory = http_factory(&config, &transport)?;
            for route in factory.routes().iter() {
                println!("{:<24} {:<7} {}", route.alias, route.method.as_str(), route.url);
            }
            Ok(())
        }
    }
}

fn check(config: &AppConfig) -> anyhow::Result<()> {
    let redactor = Redactor::new(config.limits.max_log_length);
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    for (name, transport) in &config.transport {
        match transport {
            TransportConfig::Http(http) => {
                HttpFactory::new(http, redactor).map_err(ClientError::from)?;
            }
            TransportConfig::Grpc(grpc) => {
                GrpcFactory::new(grpc, redactor, runtime.handle()).map_err(ClientError::from)?;
            }
            TransportConfig::Smtp(smtp) => {
                SmtpFactory::new(smtp, redactor).map_err(ClientError::from)?;
            }
        }
        println!("transport {:<20} {:<5} ok", name, transport.kind());
    }

    for (name, database) in &config.database {
        println!("database  {:<20} driver '{}'", name, database.driver);
    }

    println!("{}: configuration ok", config.application);
    Ok(())
}

fn http_factory(config: &AppConfig, name: &str) -> anyhow::Result<HttpFactory> {
    match config.transport(name).map_err(ClientError::from)? {
        TransportConfig::Http(http) => {
            let redactor = Redactor::new(config.limits.max_log_length);
            Ok(HttpFactory::new(http, redactor).map_err(ClientError::from)?)
        }
        _ => Err(ClientError::TransportKind {
            name: name.to_string(),
            expected: "http",
        }
        .into()),
    }
}
