use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("WAREHOUSE_CONNECTION: {0}")]
    Connection(String),
    #[error("WAREHOUSE_QUERY: {0}")]
    Query(String),
    #[error("WAREHOUSE_TIMEOUT: {0}")]
    Timeout(String),
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("DATA_INVALID: {0}")]
    Data(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "WAREHOUSE_CONNECTION",
            Self::Query(_) => "WAREHOUSE_QUERY",
            Self::Timeout(_) => "WAREHOUSE_TIMEOUT",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Config(_) => "CONFIG_INVALID",
            Self::Data(_) => "DATA_INVALID",
            Self::Io(_) => "IO_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Connection(message)
            | Self::Query(message)
            | Self::Timeout(message)
            | Self::InvalidInput(message)
            | Self::Config(message)
            | Self::Data(message)
            | Self::Io(message)
            | Self::Internal(message) => message,
        }
    }

    pub fn map_message(self, f: impl FnOnce(&str) -> String) -> Self {
        let message = f(self.message());
        match self {
            Self::Connection(_) => Self::Connection(message),
            Self::Query(_) => Self::Query(message),
            Self::Timeout(_) => Self::Timeout(message),
            Self::InvalidInput(_) => Self::InvalidInput(message),
            Self::Config(_) => Self::Config(message),
            Self::Data(_) => Self::Data(message),
            Self::Io(_) => Self::Io(message),
            Self::Internal(_) => Self::Internal(message),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Query(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout(value.to_string())
        } else {
            Self::Connection(value.to_string())
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn display_carries_code_prefix() {
        let error = AppError::Query("TABLE_OR_VIEW_NOT_FOUND".to_string());
        assert_eq!(error.to_string(), "WAREHOUSE_QUERY: TABLE_OR_VIEW_NOT_FOUND");
        assert_eq!(error.code(), "WAREHOUSE_QUERY");
    }

    #[test]
    fn map_message_keeps_variant() {
        let error = AppError::Connection("token dapi123".to_string()).map_message(|message| message.replace("dapi123", "***"));
        assert!(matches!(error, AppError::Connection(ref message) if message == "token ***"));
    }
}
