use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Story;

/// A story saved for offline viewing. Keyed by the story id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    #[serde(flatten)]
    pub story: Story,
    pub favorited_at: DateTime<Utc>,
}

impl FavoriteEntry {
    pub fn new(story: Story, favorited_at: DateTime<Utc>) -> Self {
        Self {
            story,
            favorited_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.story.id
    }
}

/// Display order for the favorites view: most recently favorited first.
pub fn sort_newest_first(entries: &mut [FavoriteEntry]) {
    entries.sort_by(|a, b| b.favorited_at.cmp(&a.favorited_at));
}
