use std::sync::Arc;

use rusqlite::{params, OptionalExtension};

use crate::api::RemoteStories;
use crate::db::{story_from_row, Resilient, STORY_COLUMNS};
use crate::error::{AppError, Result};
use crate::models::{format_timestamp, FeedOrigin, Story, StoryFeed};

const UPSERT_STORY: &str = r#"INSERT INTO stories (id, name, description, photo_url, created_at, lat, lon)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        description = excluded.description,
        photo_url = excluded.photo_url,
        created_at = excluded.created_at,
        lat = excluded.lat,
        lon = excluded.lon"#;

/// Write-through cache of the remote story listing, read back when the
/// API cannot be reached. Entries are never evicted.
pub struct StoryCache {
    remote: Arc<dyn RemoteStories>,
    db: Resilient,
}

impl StoryCache {
    pub fn new(remote: Arc<dyn RemoteStories>, db: Resilient) -> Self {
        Self { remote, db }
    }

    /// Fetch the listing and cache every story before returning it.
    pub async fn refresh_from_remote(&self) -> Result<Vec<Story>> {
        let stories = self.remote.fetch_stories().await?;
        tracing::debug!("Fetched {} stories", stories.len());

        if !self.store(&stories).await {
            tracing::warn!("Fetched stories could not be cached");
        }
        Ok(stories)
    }

    /// Remote listing when reachable, otherwise whatever is cached.
    pub async fn get_cached_or_remote(&self) -> Result<StoryFeed> {
        match self.refresh_from_remote().await {
            Ok(stories) => Ok(StoryFeed {
                stories,
                origin: FeedOrigin::Remote,
            }),
            Err(e) => {
                tracing::info!("Story API unavailable, reading cache: {}", e);
                let stories = self.cached().await;
                if stories.is_empty() {
                    return Err(AppError::NoDataAvailable);
                }
                Ok(StoryFeed {
                    stories,
                    origin: FeedOrigin::Cache,
                })
            }
        }
    }

    /// One story, from the API if possible, else from the cache. The remote
    /// error is returned when the story was never cached.
    pub async fn get_story(&self, id: &str) -> Result<Story> {
        match self.remote.fetch_story(id).await {
            Ok(story) => {
                if !self.store(std::slice::from_ref(&story)).await {
                    tracing::warn!("Story {} could not be cached", id);
                }
                Ok(story)
            }
            Err(e) => {
                tracing::info!("Story {} unavailable remotely: {}", id, e);
                self.cached_story(id).await.ok_or(e)
            }
        }
    }

    /// Every cached story, newest first.
    pub async fn cached(&self) -> Vec<Story> {
        self.db
            .run("list_cached_stories", Vec::new(), |conn| async move {
                let stories = conn
                    .call(|conn| {
                        let sql = format!(
                            "SELECT {} FROM stories ORDER BY created_at DESC",
                            STORY_COLUMNS
                        );
                        let mut stmt = conn.prepare(&sql)?;
                        let stories = stmt
                            .query_map([], story_from_row)?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        Ok(stories)
                    })
                    .await?;
                Ok(stories)
            })
            .await
    }

    pub async fn cached_story(&self, id: &str) -> Option<Story> {
        let id = id.to_string();
        self.db
            .run("get_cached_story", None, |conn| {
                let id = id.clone();
                async move {
                    let story = conn
                        .call(move |conn| {
                            let sql = format!("SELECT {} FROM stories WHERE id = ?1", STORY_COLUMNS);
                            let story = conn
                                .query_row(&sql, params![id], story_from_row)
                                .optional()?;
                            Ok(story)
                        })
                        .await?;
                    Ok(story)
                }
            })
            .await
    }

    async fn store(&self, stories: &[Story]) -> bool {
        if stories.is_empty() {
            return true;
        }

        let stories = stories.to_vec();
        self.db
            .run("cache_stories", false, |conn| {
                let stories = stories.clone();
                async move {
                    conn.call(move |conn| {
                        let tx = conn.transaction()?;
                        for story in &stories {
                            tx.execute(
                                UPSERT_STORY,
                                params![
                                    story.id,
                                    story.name,
                                    story.description,
                                    story.photo_url,
                                    format_timestamp(&story.created_at),
                                    story.lat,
                                    story.lon,
                                ],
                            )?;
                        }
                        tx.commit()?;
                        Ok(())
                    })
                    .await?;
                    Ok(true)
                }
            })
            .await
    }
}
