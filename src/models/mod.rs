mod favorite;
mod story;

pub use favorite::{sort_newest_first, FavoriteEntry};
pub use story::{format_timestamp, parse_timestamp, FeedOrigin, Story, StoryFeed};
