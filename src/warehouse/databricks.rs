use super::Warehouse;
use crate::credentials::AccessToken;
use crate::errors::{AppError, AppResult};
use crate::models::{CellValue, EndpointSummary, RowSet, WarehouseKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements/";
const MIN_WAIT_SECS: u64 = 5;
const MAX_WAIT_SECS: u64 = 50;
const HTTP_GRACE_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const MAX_RESULT_CHUNKS: usize = 64;

#[derive(Debug, Clone)]
pub struct DatabricksSettings {
    pub scheme: String,
    pub server_hostname: String,
    pub http_path: String,
    pub access_token: AccessToken,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct DatabricksWarehouse {
    settings: DatabricksSettings,
    warehouse_id: String,
}

impl DatabricksWarehouse {
    pub fn new(settings: DatabricksSettings) -> AppResult<Self> {
        if settings.server_hostname.trim().is_empty() {
            return Err(AppError::Config("warehouse server hostname is empty".to_string()));
        }
        if !matches!(settings.scheme.as_str(), "http" | "https") {
            return Err(AppError::Config(format!(
                "unsupported warehouse scheme '{}'",
                settings.scheme
            )));
        }
        let warehouse_id = warehouse_id_from_http_path(&settings.http_path)?;
        Ok(Self {
            settings,
            warehouse_id,
        })
    }

    pub fn warehouse_id(&self) -> &str {
        &self.warehouse_id
    }

    fn base_url(&self) -> String {
        format!(
            "{}://{}",
            self.settings.scheme,
            self.settings.server_hostname.trim_end_matches('/')
        )
    }

    fn wait_timeout_secs(&self) -> u64 {
        self.settings
            .request_timeout
            .as_secs()
            .clamp(MIN_WAIT_SECS, MAX_WAIT_SECS)
    }

    fn client(&self) -> AppResult<Client> {
        Client::builder()
            .timeout(Duration::from_secs(self.wait_timeout_secs() + HTTP_GRACE_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("production-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| AppError::Connection(format!("building http client: {}", error)))
    }

    fn submit(&self, client: &Client, sql: &str, deadline: Instant) -> AppResult<StatementResponse> {
        let body = json!({
            "statement": sql,
            "warehouse_id": self.warehouse_id,
            "wait_timeout": format!("{}s", submit_wait_secs(deadline.saturating_duration_since(Instant::now()))),
            "on_wait_timeout": "CONTINUE",
            "disposition": "INLINE",
            "format": "JSON_ARRAY",
        });
        let url = format!("{}{}", self.base_url(), STATEMENTS_PATH);
        let attempts = self.settings.max_attempts.max(1);

        let mut attempt = 1u32;
        loop {
            match self.send::<StatementResponse>(client.post(&url).json(&body)) {
                Ok(response) => return Ok(response),
                Err(failure)
                    if failure.retryable
                        && attempt < attempts
                        && Instant::now() + backoff_for(attempt) < deadline =>
                {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %failure.error,
                        "warehouse submission failed, retrying"
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    fn poll(&self, client: &Client, statement_id: &str) -> AppResult<StatementResponse> {
        let url = format!("{}{}{}", self.base_url(), STATEMENTS_PATH, statement_id);
        self.send(client.get(&url)).map_err(|failure| failure.error)
    }

    fn cancel(&self, client: &Client, statement_id: &str) {
        let url = format!("{}{}{}/cancel", self.base_url(), STATEMENTS_PATH, statement_id);
        let result = client
            .post(&url)
            .bearer_auth(self.settings.access_token.expose())
            .send();
        if let Err(error) = result {
            tracing::warn!(statement_id, error = %error, "failed to cancel timed out statement");
        }
    }

    fn fetch_chunk(&self, client: &Client, link: &str) -> AppResult<ResultData> {
        let url = format!("{}{}", self.base_url(), link);
        self.send(client.get(&url)).map_err(|failure| failure.error)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RequestFailure> {
        let response = request
            .bearer_auth(self.settings.access_token.expose())
            .send()
            .map_err(RequestFailure::transport)?;
        let status = response.status();
        let text = response.text().map_err(RequestFailure::transport)?;
        if !status.is_success() {
            return Err(RequestFailure::status(status, &text));
        }
        serde_json::from_str(&text).map_err(|error| RequestFailure {
            error: AppError::Connection(format!("unexpected response from warehouse: {}", error)),
            retryable: false,
        })
    }

    fn collect_rows(&self, client: &Client, response: StatementResponse) -> AppResult<RowSet> {
        let mut columns = response
            .manifest
            .map(|manifest| manifest.schema.columns)
            .unwrap_or_default();
        columns.sort_by_key(|column| column.position);
        let type_names: Vec<Option<String>> = columns.iter().map(|column| column.type_name.clone()).collect();
        let names = columns.into_iter().map(|column| column.name).collect();

        let mut rows = Vec::new();
        let mut next = response.result;
        let mut chunks = 0usize;
        while let Some(chunk) = next.take() {
            rows.extend(
                chunk
                    .data_array
                    .into_iter()
                    .map(|row| decode_row(row, &type_names)),
            );
            chunks += 1;
            if let Some(link) = chunk.next_chunk_internal_link {
                if chunks >= MAX_RESULT_CHUNKS {
                    return Err(AppError::Query(format!(
                        "result exceeded {} chunks",
                        MAX_RESULT_CHUNKS
                    )));
                }
                next = Some(self.fetch_chunk(client, &link)?);
            }
        }

        Ok(RowSet { columns: names, rows })
    }
}

impl Warehouse for DatabricksWarehouse {
    fn endpoint(&self) -> EndpointSummary {
        EndpointSummary {
            kind: WarehouseKind::Databricks,
            host: self.settings.server_hostname.clone(),
            location: self.settings.http_path.clone(),
        }
    }

    fn execute(&self, sql: &str, deadline: Instant) -> AppResult<RowSet> {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.settings.request_timeout)
            .map_or(deadline, |own| own.min(deadline));
        let client = self.client()?;

        let mut response = self.submit(&client, sql, deadline)?;
        let statement_id = response.statement_id.clone();
        tracing::debug!(statement_id = %statement_id, state = ?response.status.state, "statement submitted");

        loop {
            match response.status.state {
                StatementState::Succeeded => break,
                StatementState::Pending | StatementState::Running => {
                    if Instant::now() + self.settings.poll_interval >= deadline {
                        self.cancel(&client, &statement_id);
                        return Err(AppError::Timeout(format!(
                            "statement {} did not finish within {}ms",
                            statement_id,
                            started.elapsed().as_millis()
                        )));
                    }
                    std::thread::sleep(self.settings.poll_interval);
                    response = self.poll(&client, &statement_id)?;
                }
                StatementState::Failed => {
                    let message = response
                        .status
                        .error
                        .map(|error| error.describe())
                        .unwrap_or_else(|| "statement failed".to_string());
                    return Err(AppError::Query(message));
                }
                StatementState::Canceled | StatementState::Closed => {
                    return Err(AppError::Query(format!(
                        "statement {} ended in state {:?}",
                        statement_id, response.status.state
                    )));
                }
            }
        }

        let row_set = self.collect_rows(&client, response)?;
        tracing::info!(
            statement_id = %statement_id,
            rows = row_set.rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "warehouse statement succeeded"
        );
        Ok(row_set)
    }
}

fn backoff_for(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1).min(16))
}

// The API accepts 0 (return immediately) or 5..=50 seconds.
fn submit_wait_secs(remaining: Duration) -> u64 {
    match remaining.as_secs().min(MAX_WAIT_SECS) {
        secs if secs < MIN_WAIT_SECS => 0,
        secs => secs,
    }
}

pub fn warehouse_id_from_http_path(http_path: &str) -> AppResult<String> {
    let segments: Vec<&str> = http_path.trim().trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["sql", _, "warehouses" | "endpoints", id] if !id.is_empty() => Ok((*id).to_string()),
        _ => Err(AppError::Config(format!(
            "http path '{}' does not name a SQL warehouse",
            http_path
        ))),
    }
}

#[derive(Debug)]
struct RequestFailure {
    error: AppError,
    retryable: bool,
}

impl RequestFailure {
    fn transport(error: reqwest::Error) -> Self {
        let retryable = error.is_timeout() || error.is_connect();
        Self {
            error: AppError::from(error),
            retryable,
        }
    }

    fn status(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<ServiceError>(body)
            .map(|error| error.describe())
            .unwrap_or_else(|_| body.chars().take(200).collect());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self {
                error: AppError::Connection(format!("authentication rejected (HTTP {}): {}", status.as_u16(), detail)),
                retryable: false,
            },
            StatusCode::NOT_FOUND => Self {
                error: AppError::Connection(format!("endpoint not found (HTTP 404): {}", detail)),
                retryable: false,
            },
            StatusCode::TOO_MANY_REQUESTS => Self {
                error: AppError::Connection(format!("warehouse is throttling requests: {}", detail)),
                retryable: true,
            },
            status if status.is_server_error() => Self {
                error: AppError::Connection(format!("warehouse unavailable (HTTP {}): {}", status.as_u16(), detail)),
                retryable: true,
            },
            status => Self {
                error: AppError::Query(format!("request rejected (HTTP {}): {}", status.as_u16(), detail)),
                retryable: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultData>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: StatementState,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ServiceError {
    fn describe(self) -> String {
        match (self.error_code, self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => "unknown warehouse error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    schema: ManifestSchema,
}

#[derive(Debug, Deserialize)]
struct ManifestSchema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
    #[serde(default)]
    position: Option<usize>,
    #[serde(default)]
    type_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultData {
    #[serde(default)]
    data_array: Vec<Vec<Value>>,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
}

fn decode_row(row: Vec<Value>, type_names: &[Option<String>]) -> Vec<CellValue> {
    row.into_iter()
        .enumerate()
        .map(|(index, value)| {
            let type_name = type_names.get(index).and_then(|name| name.as_deref());
            decode_cell(value, type_name)
        })
        .collect()
}

fn decode_cell(value: Value, type_name: Option<&str>) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(value) => CellValue::Bool(value),
        Value::Number(number) => match number.as_i64() {
            Some(value) => CellValue::Int(value),
            None => number.as_f64().map(CellValue::Float).unwrap_or(CellValue::Null),
        },
        Value::String(text) => decode_text(text, type_name),
        other => CellValue::Text(other.to_string()),
    }
}

/// JSON_ARRAY results carry every value as a string; the manifest type
/// decides how it is read back. Values that do not fit stay text.
fn decode_text(text: String, type_name: Option<&str>) -> CellValue {
    let kind = type_name.unwrap_or("STRING").to_ascii_uppercase();
    let decoded = match kind.as_str() {
        "BYTE" | "TINYINT" | "SHORT" | "SMALLINT" | "INT" | "INTEGER" | "LONG" | "BIGINT" => {
            text.parse::<i64>().ok().map(CellValue::Int)
        }
        "FLOAT" | "REAL" | "DOUBLE" => text.parse::<f64>().ok().map(CellValue::Float),
        kind if kind.starts_with("DECIMAL") => text.parse::<f64>().ok().map(CellValue::Float),
        "BOOLEAN" => match text.as_str() {
            "true" => Some(CellValue::Bool(true)),
            "false" => Some(CellValue::Bool(false)),
            _ => None,
        },
        "DATE" => NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok().map(CellValue::Date),
        kind if kind.starts_with("TIMESTAMP") => parse_timestamp(&text).map(CellValue::Timestamp),
        _ => None,
    };
    decoded.unwrap_or(CellValue::Text(text))
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}
