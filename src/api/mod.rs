mod client;
mod types;

pub use client::ApiClient;
pub use types::{LoginResult, NewStory, PushKeys, PushSubscription};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Story;

/// Read side of the story API, as needed by the story cache.
#[async_trait]
pub trait RemoteStories: Send + Sync {
    async fn fetch_stories(&self) -> Result<Vec<Story>>;

    async fn fetch_story(&self, id: &str) -> Result<Story>;
}
