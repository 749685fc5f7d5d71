use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A photo story as published by the story API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub name: String,
    pub description: String,
    pub photo_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

impl Story {
    pub fn has_location(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

/// Where a list of stories came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOrigin {
    Remote,
    Cache,
}

#[derive(Debug, Clone)]
pub struct StoryFeed {
    pub stories: Vec<Story>,
    pub origin: FeedOrigin,
}

impl StoryFeed {
    pub fn is_offline(&self) -> bool {
        self.origin == FeedOrigin::Cache
    }
}

/// Stored timestamps use a fixed-width UTC form so string order is time order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_api_story_without_location() {
        let json = r#"{
            "id": "story-FvU4u0Vp2S3PMsFg",
            "name": "Dimas",
            "description": "Lorem Ipsum",
            "photoUrl": "https://story-api.dicoding.dev/images/stories/photos-1641623658595_dummy-pic.png",
            "createdAt": "2022-01-08T06:34:18.598Z",
            "lat": null,
            "lon": null
        }"#;

        let story: Story = serde_json::from_str(json).unwrap();
        assert_eq!(story.id, "story-FvU4u0Vp2S3PMsFg");
        assert!(!story.has_location());
        assert_eq!(format_timestamp(&story.created_at), "2022-01-08T06:34:18.598Z");
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let late = parse_timestamp("2024-01-01T00:00:00.5+00:00").unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }

    #[test]
    fn parses_sqlite_datetime() {
        let dt = parse_timestamp("2026-01-11 12:34:56").unwrap();
        assert_eq!(format_timestamp(&dt), "2026-01-11T12:34:56.000Z");
        assert!(parse_timestamp("yesterday").is_none());
    }
}
