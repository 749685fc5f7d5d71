use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::{favorite_from_row, Resilient, STORY_COLUMNS};
use crate::models::{format_timestamp, FavoriteEntry, Story};

const UPSERT_FAVORITE: &str = r#"INSERT INTO favorites (id, name, description, photo_url, created_at, lat, lon, favorited_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        description = excluded.description,
        photo_url = excluded.photo_url,
        created_at = excluded.created_at,
        lat = excluded.lat,
        lon = excluded.lon,
        favorited_at = excluded.favorited_at"#;

/// The favorites collection. Every write is a keyed upsert or delete, so
/// repeated or interleaved calls settle on a valid state.
#[derive(Clone)]
pub struct Favorites {
    db: Resilient,
}

impl Favorites {
    pub fn new(db: Resilient) -> Self {
        Self { db }
    }

    /// Favorite a story, or refresh `favorited_at` if it already is one.
    pub async fn add(&self, story: &Story) -> bool {
        let entry = FavoriteEntry::new(story.clone(), Utc::now());
        self.db
            .run("add_favorite", false, |conn| {
                let entry = entry.clone();
                async move {
                    conn.call(move |conn| {
                        let story = &entry.story;
                        conn.execute(
                            UPSERT_FAVORITE,
                            params![
                                story.id,
                                story.name,
                                story.description,
                                story.photo_url,
                                format_timestamp(&story.created_at),
                                story.lat,
                                story.lon,
                                format_timestamp(&entry.favorited_at),
                            ],
                        )?;
                        Ok(())
                    })
                    .await?;
                    Ok(true)
                }
            })
            .await
    }

    /// Removing an id that is not a favorite still succeeds.
    pub async fn remove(&self, id: &str) -> bool {
        let id = id.to_string();
        self.db
            .run("remove_favorite", false, |conn| {
                let id = id.clone();
                async move {
                    conn.call(move |conn| {
                        conn.execute("DELETE FROM favorites WHERE id = ?1", params![id])?;
                        Ok(())
                    })
                    .await?;
                    Ok(true)
                }
            })
            .await
    }

    pub async fn is_favorited(&self, id: &str) -> bool {
        if id.trim().is_empty() {
            return false;
        }

        let id = id.to_string();
        self.db
            .run("is_favorited", false, |conn| {
                let id = id.clone();
                async move {
                    let exists = conn
                        .call(move |conn| {
                            let exists: bool = conn.query_row(
                                "SELECT EXISTS(SELECT 1 FROM favorites WHERE id = ?1)",
                                params![id],
                                |row| row.get(0),
                            )?;
                            Ok(exists)
                        })
                        .await?;
                    Ok(exists)
                }
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Option<FavoriteEntry> {
        if id.trim().is_empty() {
            return None;
        }

        let id = id.to_string();
        self.db
            .run("get_favorite", None, |conn| {
                let id = id.clone();
                async move {
                    let entry = conn
                        .call(move |conn| {
                            let sql = format!(
                                "SELECT {}, favorited_at FROM favorites WHERE id = ?1",
                                STORY_COLUMNS
                            );
                            let entry = conn
                                .query_row(&sql, params![id], favorite_from_row)
                                .optional()?;
                            Ok(entry)
                        })
                        .await?;
                    Ok(entry)
                }
            })
            .await
    }

    /// All favorites in storage order. See `models::sort_newest_first`.
    pub async fn list(&self) -> Vec<FavoriteEntry> {
        self.db
            .run("list_favorites", Vec::new(), |conn| async move {
                let entries = conn
                    .call(|conn| {
                        let sql = format!("SELECT {}, favorited_at FROM favorites", STORY_COLUMNS);
                        let mut stmt = conn.prepare(&sql)?;
                        let entries = stmt
                            .query_map([], favorite_from_row)?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        Ok(entries)
                    })
                    .await?;
                Ok(entries)
            })
            .await
    }

    pub async fn count(&self) -> usize {
        self.db
            .run("count_favorites", 0, |conn| async move {
                let count = conn
                    .call(|conn| {
                        let count: i64 =
                            conn.query_row("SELECT COUNT(*) FROM favorites", [], |row| row.get(0))?;
                        Ok(count)
                    })
                    .await?;
                Ok(usize::try_from(count).unwrap_or_default())
            })
            .await
    }

    /// Deletes every favorite; the table itself stays.
    pub async fn clear(&self) -> bool {
        self.db
            .run("clear_favorites", false, |conn| async move {
                conn.call(|conn| {
                    conn.execute("DELETE FROM favorites", [])?;
                    Ok(())
                })
                .await?;
                Ok(true)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LocalStore, RecoveryPolicy, RetryPolicy, StoreSettings};
    use chrono::{DateTime, TimeZone};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn favorites_in(dir: &TempDir, enabled: bool) -> Favorites {
        let store = LocalStore::new(StoreSettings {
            path: dir.path().join("stories.db"),
            enabled,
            recovery: RecoveryPolicy::Rebuild,
        });
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        };
        Favorites::new(Resilient::new(Arc::new(store), policy))
    }

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn story(id: &str) -> Story {
        Story {
            id: id.to_string(),
            name: "Jane".to_string(),
            description: "Sunset".to_string(),
            photo_url: "http://x/p.jpg".to_string(),
            created_at: created_at(),
            lat: None,
            lon: None,
        }
    }

    #[tokio::test]
    async fn add_list_clear_scenario() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, true);
        let before = Utc::now();

        assert!(favorites.add(&story("s1")).await);

        let entries = favorites.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].story, story("s1"));
        // Stored with millisecond precision.
        assert!(entries[0].favorited_at >= before - chrono::Duration::milliseconds(1));

        assert!(favorites.clear().await);
        assert!(favorites.list().await.is_empty());
    }

    #[tokio::test]
    async fn adding_twice_keeps_one_entry_with_newer_timestamp() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, true);

        assert!(favorites.add(&story("s1")).await);
        let first = favorites.get("s1").await.unwrap().favorited_at;

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(favorites.add(&story("s1")).await);

        assert_eq!(favorites.count().await, 1);
        let second = favorites.get("s1").await.unwrap().favorited_at;
        assert!(second > first);
    }

    #[tokio::test]
    async fn favorite_round_trip() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, true);

        assert!(!favorites.is_favorited("s1").await);
        favorites.add(&story("s1")).await;
        assert!(favorites.is_favorited("s1").await);
        favorites.remove("s1").await;
        assert!(!favorites.is_favorited("s1").await);
    }

    #[tokio::test]
    async fn keeps_location_fields() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, true);
        let mut located = story("geo");
        located.lat = Some(-6.2);
        located.lon = Some(106.8);

        favorites.add(&located).await;
        let entry = favorites.get("geo").await.unwrap();
        assert_eq!(entry.story.lat, Some(-6.2));
        assert_eq!(entry.story.lon, Some(106.8));
    }

    #[tokio::test]
    async fn removing_missing_entry_succeeds() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, true);
        assert!(favorites.remove("nope").await);
    }

    #[tokio::test]
    async fn blank_id_is_never_favorited() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, true);

        assert!(!favorites.is_favorited("").await);
        assert!(!favorites.is_favorited("   ").await);
        assert!(favorites.get("").await.is_none());
        // Blank ids never reach the store.
        assert_eq!(favorites.db.store().opens(), 0);
    }

    #[tokio::test]
    async fn count_tracks_entries() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, true);

        assert_eq!(favorites.count().await, 0);
        for id in ["a", "b", "c"] {
            favorites.add(&story(id)).await;
        }
        assert_eq!(favorites.count().await, 3);
        favorites.remove("b").await;
        assert_eq!(favorites.count().await, 2);
    }

    #[tokio::test]
    async fn interleaved_toggles_end_in_a_valid_state() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, true);
        let s1 = story("s1");

        for _ in 0..5 {
            let (added, removed) = tokio::join!(favorites.add(&s1), favorites.remove("s1"));
            assert!(added && removed);
            let count = favorites.count().await;
            assert!(count <= 1);
            assert_eq!(favorites.is_favorited("s1").await, count == 1);
        }
    }

    #[tokio::test]
    async fn unsupported_store_degrades_to_soft_failures() {
        let dir = TempDir::new().unwrap();
        let favorites = favorites_in(&dir, false);

        assert!(!favorites.add(&story("s1")).await);
        assert!(!favorites.remove("s1").await);
        assert!(!favorites.is_favorited("s1").await);
        assert!(favorites.list().await.is_empty());
        assert_eq!(favorites.count().await, 0);
        assert!(!favorites.clear().await);
    }
}
