use crate::errors::{AppError, AppResult};
use crate::models::DashboardVariant;
use crate::warehouse::TableName;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TABLE: &str = "produccion_petrolera";
pub const DEFAULT_BIND: &str = "127.0.0.1:8501";
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3_600;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Databricks,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarehouseSettings {
    pub backend: BackendKind,
    pub scheme: String,
    pub server_hostname: String,
    pub http_path: String,
    pub sqlite_path: Option<PathBuf>,
    pub table: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Databricks,
            scheme: "https".to_string(),
            server_hostname: String::new(),
            http_path: String::new(),
            sqlite_path: None,
            table: DEFAULT_TABLE.to_string(),
            request_timeout_secs: 60,
            poll_interval_ms: 500,
            max_attempts: 3,
        }
    }
}

impl WarehouseSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn table_name(&self) -> AppResult<TableName> {
        TableName::new(&self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        self.bind
            .parse()
            .map_err(|_| AppError::Config(format!("bind address '{}' is not host:port", self.bind)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardSettings {
    pub variant: DashboardVariant,
    pub title: String,
    pub description: String,
    pub footer: Option<String>,
    pub export_file_name: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            variant: DashboardVariant::Extended,
            title: "Dashboard Producción Petrolera".to_string(),
            description: "Explora los datos de producción petrolera consultados desde el warehouse y visualiza gráficos dinámicos.".to_string(),
            footer: None,
            export_file_name: "produccion_petrolera.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub directory: Option<PathBuf>,
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub warehouse: WarehouseSettings,
    pub server: ServerSettings,
    pub dashboard: DashboardSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("reading {}: {}", path.display(), error)))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(raw)?;
        if mentions_access_token(&value) {
            return Err(AppError::Config(
                "access tokens are not read from config files; use DATABRICKS_ACCESS_TOKEN or the keyring".to_string(),
            ));
        }
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(value)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AppResult<()> {
        let get = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        if let Some(value) = get("DATABRICKS_SERVER_HOSTNAME") {
            self.warehouse.server_hostname = value;
        }
        if let Some(value) = get("DATABRICKS_HTTP_PATH") {
            self.warehouse.http_path = value;
        }
        if let Some(value) = get("DASHBOARD_TABLE") {
            self.warehouse.table = value;
        }
        if let Some(value) = get("DASHBOARD_BIND") {
            self.server.bind = value;
        }
        if let Some(value) = get("DASHBOARD_VARIANT") {
            self.dashboard.variant = DashboardVariant::parse(&value).ok_or_else(|| {
                AppError::Config(format!(
                    "DASHBOARD_VARIANT must be 'basic' or 'extended', got '{}'",
                    value
                ))
            })?;
        }
        if let Some(value) = get("DASHBOARD_LOG_DIR") {
            self.logging.directory = Some(PathBuf::from(value));
        }
        Ok(())
    }

    pub fn use_sqlite(&mut self, path: PathBuf) {
        self.warehouse.backend = BackendKind::Sqlite;
        self.warehouse.sqlite_path = Some(path);
    }

    pub fn validate(&self) -> AppResult<()> {
        self.warehouse.table_name()?;
        self.server.socket_addr()?;

        let warehouse = &self.warehouse;
        match warehouse.backend {
            BackendKind::Databricks => {
                if warehouse.server_hostname.trim().is_empty() {
                    return Err(AppError::Config(
                        "warehouse.server_hostname is required (or DATABRICKS_SERVER_HOSTNAME)".to_string(),
                    ));
                }
                if warehouse.http_path.trim().is_empty() {
                    return Err(AppError::Config(
                        "warehouse.http_path is required (or DATABRICKS_HTTP_PATH)".to_string(),
                    ));
                }
            }
            BackendKind::Sqlite => {
                if warehouse.sqlite_path.is_none() {
                    return Err(AppError::Config("warehouse.sqlite_path is required for the sqlite backend".to_string()));
                }
            }
        }

        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&warehouse.request_timeout_secs) {
            return Err(AppError::Config(format!(
                "warehouse.request_timeout_secs must be between 1 and {}",
                MAX_REQUEST_TIMEOUT_SECS
            )));
        }
        if !(1..=MAX_POLL_INTERVAL_MS).contains(&warehouse.poll_interval_ms) {
            return Err(AppError::Config(format!(
                "warehouse.poll_interval_ms must be between 1 and {}",
                MAX_POLL_INTERVAL_MS
            )));
        }
        if !(1..=MAX_ATTEMPTS).contains(&warehouse.max_attempts) {
            return Err(AppError::Config(format!(
                "warehouse.max_attempts must be between 1 and {}",
                MAX_ATTEMPTS
            )));
        }
        if self.dashboard.export_file_name.trim().is_empty() {
            return Err(AppError::Config("dashboard.export_file_name is empty".to_string()));
        }
        Ok(())
    }
}

fn mentions_access_token(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::Mapping(mapping) => mapping.iter().any(|(key, value)| {
            let is_token_key = key
                .as_str()
                .map(|key| key.eq_ignore_ascii_case("access_token") || key.eq_ignore_ascii_case("token"))
                .unwrap_or(false);
            is_token_key || mentions_access_token(value)
        }),
        serde_yaml::Value::Sequence(items) => items.iter().any(mentions_access_token),
        _ => false,
    }
}
