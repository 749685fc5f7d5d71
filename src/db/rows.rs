use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

use crate::models::{parse_timestamp, FavoriteEntry, Story};

pub const STORY_COLUMNS: &str = "id, name, description, photo_url, created_at, lat, lon";

pub fn story_from_row(row: &Row) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        photo_url: row.get(3)?,
        created_at: timestamp_at(row, 4)?,
        lat: row.get(5)?,
        lon: row.get(6)?,
    })
}

/// Expects the story columns followed by `favorited_at`.
pub fn favorite_from_row(row: &Row) -> rusqlite::Result<FavoriteEntry> {
    Ok(FavoriteEntry {
        story: story_from_row(row)?,
        favorited_at: timestamp_at(row, 7)?,
    })
}

fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp {:?}", raw).into(),
        )
    })
}
