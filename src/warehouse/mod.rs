pub mod databricks;
pub mod query;
pub mod sqlite;

use crate::errors::AppResult;
use crate::models::{EndpointSummary, RowSet};
use std::time::Instant;

pub use query::{RowLimit, SelectQuery, TableName};

/// A SQL endpoint that runs one statement per call. Implementations acquire
/// their connection inside `execute` and release it before returning, on
/// success and on failure alike. Remote statements still running at
/// `deadline` are cancelled and reported as `AppError::Timeout`.
pub trait Warehouse: Send + Sync {
    fn endpoint(&self) -> EndpointSummary;

    fn execute(&self, sql: &str, deadline: Instant) -> AppResult<RowSet>;

    fn run(&self, query: &SelectQuery, deadline: Instant) -> AppResult<RowSet> {
        self.execute(&query.sql(), deadline)
    }
}
