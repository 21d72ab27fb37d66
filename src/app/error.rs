use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Unknown network: {0}")]
    NetworkNotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of a login or refresh against a partner site.
///
/// Cloneable so one in-flight refresh can hand the same outcome to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("partner rejected the session: {0}")]
    Rejected(String),

    #[error("authentication timed out after {0:?}")]
    Timeout(Duration),

    #[error("authenticator unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
