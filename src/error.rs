use thiserror::Error;

use crate::db::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("No cached stories are available and the story API could not be reached")]
    NoDataAvailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Failures that mean "the remote API is unavailable", whether the API
    /// reported it or the request never completed.
    pub fn is_remote(&self) -> bool {
        matches!(self, AppError::Http(_) | AppError::Api(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
