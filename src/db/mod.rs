mod engine;
mod retry;
mod rows;
pub mod schema;

pub use engine::{LocalStore, RecoveryPolicy, StoreSettings, StoreStatus};
pub use retry::{Resilient, RetryPolicy};
pub(crate) use rows::{favorite_from_row, story_from_row, STORY_COLUMNS};

use thiserror::Error;

/// Failures of the local store. Cloneable so a shared open can hand the
/// same outcome to every waiting caller.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("local persistence is unavailable: {0}")]
    Unsupported(String),

    #[error("schema is missing tables: {}", .0.join(", "))]
    SchemaIncomplete(Vec<String>),

    #[error("store operation failed: {0}")]
    Transient(String),

    #[error("{operation} gave up after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
}

impl StoreError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, StoreError::Unsupported(_))
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        StoreError::Transient(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Transient(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
