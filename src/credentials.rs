use crate::errors::{AppError, AppResult};
use std::fmt;

pub const ACCESS_TOKEN_ENV: &str = "DATABRICKS_ACCESS_TOKEN";
const KEYRING_SERVICE: &str = "production-dashboard";
const KEYRING_ACCOUNT: &str = "databricks-access-token";

/// Warehouse access token. Never printed, never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(AppError::Config("access token is empty".to_string()));
        }
        Ok(Self(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    Keyring,
}

impl TokenSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Keyring => "keyring",
        }
    }
}

pub fn resolve_access_token(lookup: impl Fn(&str) -> Option<String>) -> AppResult<(AccessToken, TokenSource)> {
    if let Some(value) = lookup(ACCESS_TOKEN_ENV).filter(|value| !value.trim().is_empty()) {
        return Ok((AccessToken::new(value)?, TokenSource::Environment));
    }

    match load_keyring_token()? {
        Some(token) => Ok((token, TokenSource::Keyring)),
        None => Err(AppError::Config(format!(
            "no warehouse access token: set {} or store one with `production-dashboard token set`",
            ACCESS_TOKEN_ENV
        ))),
    }
}

fn keyring_entry() -> AppResult<keyring::Entry> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT).map_err(|error| AppError::Io(error.to_string()))
}

pub fn load_keyring_token() -> AppResult<Option<AccessToken>> {
    let entry = keyring_entry()?;
    match entry.get_password() {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => AccessToken::new(value).map(Some),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(error) => Err(AppError::Io(error.to_string())),
    }
}

pub fn save_keyring_token(token: &AccessToken) -> AppResult<()> {
    keyring_entry()?
        .set_password(token.expose())
        .map_err(|error| AppError::Io(error.to_string()))
}

pub fn clear_keyring_token() -> AppResult<bool> {
    match keyring_entry()?.delete_credential() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(error) => Err(AppError::Io(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_access_token, AccessToken, TokenSource, ACCESS_TOKEN_ENV};

    #[test]
    fn debug_output_hides_the_token() {
        let token = AccessToken::new("dapi0123456789abcdef").expect("token");
        assert_eq!(format!("{:?}", token), "AccessToken([REDACTED])");
        assert_eq!(token.expose(), "dapi0123456789abcdef");
    }

    #[test]
    fn blank_tokens_are_rejected() {
        assert!(AccessToken::new("   ").is_err());
    }

    #[test]
    fn environment_token_wins() {
        let (token, source) = resolve_access_token(|key| {
            (key == ACCESS_TOKEN_ENV).then(|| " dapi-from-env ".to_string())
        })
        .expect("token");
        assert_eq!(token.expose(), "dapi-from-env");
        assert_eq!(source, TokenSource::Environment);
    }
}
