mod favorites;
mod story_cache;
mod user_data;

pub use favorites::Favorites;
pub use story_cache::StoryCache;
pub use user_data::UserData;
