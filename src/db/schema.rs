/// Version stamped into `PRAGMA user_version` when the schema is created.
pub const SCHEMA_VERSION: i64 = 1;

pub const FAVORITES_TABLE: &str = "favorites";
pub const STORIES_TABLE: &str = "stories";
pub const USER_DATA_TABLE: &str = "user_data";

/// Every one of these must exist for the database to be usable.
pub const REQUIRED_TABLES: [&str; 3] = [FAVORITES_TABLE, STORIES_TABLE, USER_DATA_TABLE];

pub const SCHEMA: &str = r#"
-- favorites table (favorited stories kept for offline viewing)
CREATE TABLE IF NOT EXISTS favorites (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    lat REAL,
    lon REAL,
    favorited_at TEXT NOT NULL
);

-- stories table (cache of the remote story listing)
CREATE TABLE IF NOT EXISTS stories (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    lat REAL,
    lon REAL
);

CREATE INDEX IF NOT EXISTS idx_stories_created_at ON stories(created_at);

-- user_data table (JSON values keyed by name)
CREATE TABLE IF NOT EXISTS user_data (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;
