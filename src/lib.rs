pub mod charts;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod errors;
pub mod models;
pub mod redaction;
pub mod schema;
pub mod server;
pub mod summary;
pub mod table;
pub mod warehouse;

use crate::config::{AppConfig, BackendKind, LoggingSettings};
use crate::credentials::AccessToken;
use crate::dashboard::DashboardService;
use crate::errors::{AppError, AppResult};
use crate::redaction::Redactor;
use crate::server::ServerState;
use crate::warehouse::databricks::{DatabricksSettings, DatabricksWarehouse};
use crate::warehouse::sqlite::SqliteWarehouse;
use crate::warehouse::Warehouse;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const RETRY_ALLOWANCE: Duration = Duration::from_secs(5);
// Room for an in-flight HTTP call and the cancel request after the warehouse
// deadline, before the server gives up on the blocking job.
const SERVER_GRACE: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
#[command(name = "production-dashboard", version, about = "Oil production dashboard backed by a SQL warehouse")]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "DASHBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the dashboard over HTTP (default)
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:8501
        #[arg(long)]
        bind: Option<String>,
        /// Read from a local SQLite file instead of the remote warehouse
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },
    /// Run the query once and write the table as CSV
    Export {
        /// Number of rows to fetch (1-30)
        #[arg(long)]
        limit: Option<String>,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },
    /// Manage the access token stored in the OS keyring
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum TokenAction {
    /// Read a token from stdin and store it
    Set,
    /// Remove the stored token
    Clear,
    /// Report whether a token is stored
    Status,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging)?;

    let command = cli.command.unwrap_or(Command::Serve {
        bind: None,
        sqlite: None,
    });

    match command {
        Command::Serve { bind, sqlite } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(path) = sqlite {
                config.use_sqlite(path);
            }
            let service = build_service(&config)?;
            let addr = config.server.socket_addr()?;
            let deadline = service.request_budget() + SERVER_GRACE;
            let state = ServerState::new(Arc::new(service), deadline);

            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(server::serve(state, addr))?;
        }
        Command::Export { limit, output, sqlite } => {
            if let Some(path) = sqlite {
                config.use_sqlite(path);
            }
            let service = build_service(&config)?;
            let file = service.export(limit.as_deref())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &file.content)?;
                    eprintln!("wrote {} rows to {}", file.row_count, path.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(file.content.as_bytes())?;
                    stdout.flush()?;
                }
            }
        }
        Command::Token { action } => run_token_action(action)?,
    }

    Ok(())
}

fn run_token_action(action: TokenAction) -> AppResult<()> {
    match action {
        TokenAction::Set => {
            let mut raw = String::new();
            std::io::stdin().read_line(&mut raw)?;
            let token = AccessToken::new(raw)?;
            credentials::save_keyring_token(&token)?;
            eprintln!("access token stored in the OS keyring");
        }
        TokenAction::Clear => {
            if credentials::clear_keyring_token()? {
                eprintln!("access token removed from the OS keyring");
            } else {
                eprintln!("no access token was stored");
            }
        }
        TokenAction::Status => {
            let stored = credentials::load_keyring_token()?.is_some();
            println!("{}", if stored { "stored" } else { "missing" });
        }
    }
    Ok(())
}

pub fn build_service(config: &AppConfig) -> AppResult<DashboardService> {
    config.validate()?;
    let table = config.warehouse.table_name()?;
    let settings = &config.warehouse;

    let (warehouse, redactor): (Arc<dyn Warehouse>, Redactor) = match settings.backend {
        BackendKind::Databricks => {
            let (token, source) = credentials::resolve_access_token(|key| std::env::var(key).ok())?;
            tracing::info!(source = source.as_str(), "warehouse access token resolved");
            let redactor = Redactor::new().with_secret(token.expose());
            let warehouse = DatabricksWarehouse::new(DatabricksSettings {
                scheme: settings.scheme.clone(),
                server_hostname: settings.server_hostname.clone(),
                http_path: settings.http_path.clone(),
                access_token: token,
                request_timeout: settings.request_timeout(),
                poll_interval: settings.poll_interval(),
                max_attempts: settings.max_attempts,
            })?;
            (Arc::new(warehouse), redactor)
        }
        BackendKind::Sqlite => {
            let path = settings
                .sqlite_path
                .as_deref()
                .ok_or_else(|| AppError::Config("warehouse.sqlite_path is not set".to_string()))?;
            (Arc::new(SqliteWarehouse::new(path)), Redactor::new())
        }
    };

    let endpoint = warehouse.endpoint();
    tracing::info!(
        backend = endpoint.kind.as_str(),
        host = %endpoint.host,
        location = %endpoint.location,
        table = %table,
        variant = config.dashboard.variant.as_str(),
        "dashboard service configured"
    );

    Ok(DashboardService::new(warehouse, config.dashboard.clone(), table)
        .with_redactor(redactor)
        .with_request_budget(request_deadline(config)))
}

pub fn request_deadline(config: &AppConfig) -> Duration {
    config.warehouse.request_timeout() * config.warehouse.max_attempts.max(1) + RETRY_ALLOWANCE
}

fn init_tracing(logging: &LoggingSettings) -> AppResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.filter));

    match &logging.directory {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "dashboard.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(non_blocking)
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    }
    .map_err(|error| AppError::Internal(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{build_service, request_deadline, Cli, Command};
    use crate::config::AppConfig;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn deadline_covers_every_attempt() {
        let mut config = AppConfig::default();
        config.warehouse.request_timeout_secs = 10;
        config.warehouse.max_attempts = 3;
        assert_eq!(request_deadline(&config), Duration::from_secs(35));
    }

    #[test]
    fn oversized_timeouts_are_rejected_before_arithmetic() {
        let mut config = AppConfig::default();
        config.use_sqlite("missing.sqlite".into());
        config.warehouse.request_timeout_secs = u64::MAX;
        let error = build_service(&config).err().expect("rejected");
        assert_eq!(error.code(), "CONFIG_INVALID");
    }

    #[test]
    fn sqlite_backend_builds_without_token() {
        let mut config = AppConfig::default();
        config.use_sqlite("missing.sqlite".into());
        let service = build_service(&config).expect("service");
        assert_eq!(service.endpoint().location, "missing.sqlite");
        assert_eq!(service.request_budget(), request_deadline(&config));
    }

    #[test]
    fn cli_parses_export_flags() {
        let cli = Cli::parse_from(["production-dashboard", "export", "--limit", "5", "-o", "out.csv"]);
        match cli.command {
            Some(Command::Export { limit, output, sqlite }) => {
                assert_eq!(limit.as_deref(), Some("5"));
                assert_eq!(output.expect("output").to_string_lossy(), "out.csv");
                assert!(sqlite.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
