use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_rusqlite::Connection;

use super::{LocalStore, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: the wait after the nth failed attempt is n × base.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Runs store operations against a freshly validated handle, retrying
/// transient failures.
#[derive(Clone)]
pub struct Resilient {
    store: Arc<LocalStore>,
    policy: RetryPolicy,
}

impl Resilient {
    pub fn new(store: Arc<LocalStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Best-effort variant of [`Resilient::try_run`]: once every attempt has
    /// failed, logs the error and returns `fallback`.
    pub async fn run<T, F, Fut>(&self, operation: &str, fallback: T, op: F) -> T
    where
        F: FnMut(Connection) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        match self.try_run(operation, op).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("{}", e);
                fallback
            }
        }
    }

    pub async fn try_run<T, F, Fut>(&self, operation: &str, mut op: F) -> StoreResult<T>
    where
        F: FnMut(Connection) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            // handle() validates the schema and rebuilds inline if needed.
            let result = match self.store.handle().await {
                Ok(conn) => op(conn).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_unsupported() => return Err(e),
                Err(e) => {
                    tracing::debug!(
                        operation,
                        attempt,
                        "Store operation failed: {}",
                        e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        Err(StoreError::Exhausted {
            operation: operation.to_string(),
            attempts,
            last: last_error,
        })
    }
}
