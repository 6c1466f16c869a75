use crate::errors::{AppError, AppResult};
use crate::models::LimitBounds;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*){0,2}$").expect("valid table name regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowLimit(u32);

impl RowLimit {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 30;
    pub const DEFAULT: RowLimit = RowLimit(30);

    pub fn new(value: u32) -> AppResult<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(AppError::InvalidInput(format!(
                "row limit must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(AppError::InvalidInput(format!(
                "row limit must be a non-negative integer, got '{}'",
                raw
            )));
        }
        let value = trimmed
            .parse::<u32>()
            .map_err(|_| AppError::InvalidInput(format!("row limit '{}' is out of range", raw)))?;
        Self::new(value)
    }

    pub fn from_param(raw: Option<&str>) -> AppResult<Self> {
        match raw {
            None => Ok(Self::DEFAULT),
            Some(raw) => Self::parse(raw),
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn bounds() -> LimitBounds {
        LimitBounds {
            min: Self::MIN,
            max: Self::MAX,
            default: Self::DEFAULT.0,
        }
    }
}

impl Default for RowLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for RowLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn new(value: &str) -> AppResult<Self> {
        let value = value.trim();
        if !TABLE_NAME_RE.is_match(value) {
            return Err(AppError::Config(format!(
                "table name '{}' must be an identifier, optionally qualified as schema.table or catalog.schema.table",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    table: TableName,
    limit: RowLimit,
}

impl SelectQuery {
    pub fn new(table: TableName, limit: RowLimit) -> Self {
        Self { table, limit }
    }

    pub fn limit(&self) -> RowLimit {
        self.limit
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Both parts are validated types, so interpolation cannot inject SQL.
    pub fn sql(&self) -> String {
        format!("SELECT * FROM {} LIMIT {}", self.table, self.limit)
    }
}
