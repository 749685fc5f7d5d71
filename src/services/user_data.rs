use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::Resilient;

/// JSON values stored under string keys in the `user_data` table.
#[derive(Clone)]
pub struct UserData {
    db: Resilient,
}

impl UserData {
    pub fn new(db: Resilient) -> Self {
        Self { db }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = key.to_string();
        let raw = self
            .db
            .run("get_user_data", None, |conn| {
                let key = key.clone();
                async move {
                    let value = conn
                        .call(move |conn| {
                            let value = conn
                                .query_row(
                                    "SELECT value FROM user_data WHERE key = ?1",
                                    params![key],
                                    |row| row.get::<_, String>(0),
                                )
                                .optional()?;
                            Ok(value)
                        })
                        .await?;
                    Ok(value)
                }
            })
            .await?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring unreadable user data {:?}: {}", key, e);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Cannot serialize user data {:?}: {}", key, e);
                return false;
            }
        };

        let key = key.to_string();
        self.db
            .run("set_user_data", false, |conn| {
                let key = key.clone();
                let raw = raw.clone();
                async move {
                    conn.call(move |conn| {
                        conn.execute(
                            "INSERT INTO user_data (key, value) VALUES (?1, ?2)
                             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                            params![key, raw],
                        )?;
                        Ok(())
                    })
                    .await?;
                    Ok(true)
                }
            })
            .await
    }

    pub async fn remove(&self, key: &str) -> bool {
        let key = key.to_string();
        self.db
            .run("remove_user_data", false, |conn| {
                let key = key.clone();
                async move {
                    conn.call(move |conn| {
                        conn.execute("DELETE FROM user_data WHERE key = ?1", params![key])?;
                        Ok(())
                    })
                    .await?;
                    Ok(true)
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LocalStore, RecoveryPolicy, RetryPolicy, StoreSettings};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn user_data_in(dir: &TempDir) -> UserData {
        let store = LocalStore::new(StoreSettings {
            path: dir.path().join("stories.db"),
            enabled: true,
            recovery: RecoveryPolicy::Rebuild,
        });
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        };
        UserData::new(Resilient::new(Arc::new(store), policy))
    }

    #[tokio::test]
    async fn stores_typed_values() {
        let dir = TempDir::new().unwrap();
        let data = user_data_in(&dir);
        let synced = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();

        assert!(data.set("last_synced_at", &synced).await);
        assert!(data.set("push_endpoint", &"https://push.example/abc").await);

        let read: Option<DateTime<Utc>> = data.get("last_synced_at").await;
        assert_eq!(read, Some(synced));
        let endpoint: Option<String> = data.get("push_endpoint").await;
        assert_eq!(endpoint.as_deref(), Some("https://push.example/abc"));
    }

    #[tokio::test]
    async fn overwrites_and_removes() {
        let dir = TempDir::new().unwrap();
        let data = user_data_in(&dir);

        data.set("theme", &"dark").await;
        data.set("theme", &"light").await;
        assert_eq!(data.get::<String>("theme").await.as_deref(), Some("light"));

        assert!(data.remove("theme").await);
        assert_eq!(data.get::<String>("theme").await, None);
        assert!(data.remove("theme").await);
    }

    #[tokio::test]
    async fn mismatched_type_reads_as_missing() {
        let dir = TempDir::new().unwrap();
        let data = user_data_in(&dir);

        data.set("count", &"not a number").await;
        assert_eq!(data.get::<u32>("count").await, None);
    }
}
