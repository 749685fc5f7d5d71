use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::api::{ApiClient, NewStory};
use crate::auth::Session;
use crate::cli::{AppAction, USAGE};
use crate::config::Config;
use crate::db::{LocalStore, Resilient, StoreStatus};
use crate::error::{AppError, Result};
use crate::models::{sort_newest_first, FavoriteEntry, Story};
use crate::routes::{guard, Access, Navigator, Route};
use crate::services::{Favorites, StoryCache, UserData};

const LAST_SYNCED_KEY: &str = "last_synced_at";
const PUSH_ENDPOINT_KEY: &str = "push_endpoint";
const USER_ID_KEY: &str = "user_id";
const TEXT_WIDTH: usize = 72;

/// Prints where the user should go next; a terminal has no location bar.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, route: &Route) {
        println!("-> {}", route);
    }
}

pub struct App {
    store: Arc<LocalStore>,
    session: Arc<Session>,
    api: Arc<ApiClient>,
    favorites: Favorites,
    stories: StoryCache,
    user_data: UserData,
}

impl App {
    /// Wires the services together. The local store is opened lazily by the
    /// first operation that needs it.
    pub fn new(config: &Config) -> Result<Self> {
        let store = Arc::new(LocalStore::new(config.store_settings()));
        let db = Resilient::new(Arc::clone(&store), config.retry_policy());

        let session = Arc::new(Session::load(&config.session_path)?);
        let api = Arc::new(ApiClient::new(
            &config.api_base_url,
            config.request_timeout(),
            Arc::clone(&session),
        )?);

        Ok(Self {
            favorites: Favorites::new(db.clone()),
            stories: StoryCache::new(api.clone(), db.clone()),
            user_data: UserData::new(db),
            store,
            session,
            api,
        })
    }

    pub async fn handle_action(&self, action: AppAction) -> Result<()> {
        match action {
            AppAction::Help => print!("{}", USAGE),

            AppAction::Login { email, password } => {
                let login = self.api.login(&email, &password).await?;
                self.session.set_token(&login.token)?;
                self.user_data.set(USER_ID_KEY, &login.user_id).await;
                println!("Welcome, {}!", login.name);
            }

            AppAction::Register {
                name,
                email,
                password,
            } => {
                let message = self.api.register(&name, &email, &password).await?;
                println!("{}", message);
                ConsoleNavigator.navigate(&Route::Login);
            }

            AppAction::Logout => {
                self.session.clear(&ConsoleNavigator)?;
                self.user_data.remove(USER_ID_KEY).await;
                println!("Signed out.");
            }

            AppAction::ListStories => self.list_stories().await?,

            AppAction::RefreshStories => {
                let stories = self.stories.refresh_from_remote().await?;
                self.mark_synced().await;
                println!("Refreshed {} stories", stories.len());
            }

            AppAction::ShowStory { id, open_photo } => {
                let story = self.show_story(&id).await?;
                if open_photo {
                    let _ = open::that(&story.photo_url);
                }
            }

            AppAction::PostStory {
                photo,
                description,
                location,
                guest,
            } => {
                if !guest {
                    if let Access::Redirect(_) = guard(Route::AddStory, self.session.is_logged_in()) {
                        return Err(AppError::Usage(
                            "Posting requires a login; sign in or pass --guest".to_string(),
                        ));
                    }
                }

                let mut story = NewStory::from_file(&photo, &description).await?;
                if let Some((lat, lon)) = location {
                    story = story.at(lat, lon);
                }

                let message = if guest {
                    self.api.add_guest_story(&story).await?
                } else {
                    self.api.add_story(&story).await?
                };
                tracing::info!("Posted story: {}", description);
                println!("{}", message);
            }

            AppAction::AddFavorite(id) => {
                let story = match self.stories.cached_story(&id).await {
                    Some(story) => story,
                    None => self.stories.get_story(&id).await?,
                };
                if !self.favorites.add(&story).await {
                    return Err(AppError::Usage(format!("Could not save {} to favorites", id)));
                }
                println!("Added \"{}\" to favorites", story.description);
            }

            AppAction::RemoveFavorite(id) => {
                if !self.favorites.remove(&id).await {
                    return Err(AppError::Usage(format!("Could not remove {} from favorites", id)));
                }
                println!("Story removed from favorites");
            }

            AppAction::ListFavorites => self.list_favorites().await,

            AppAction::CountFavorites => println!("{}", self.favorites.count().await),

            AppAction::ClearFavorites => {
                if !self.favorites.clear().await {
                    return Err(AppError::Usage("Could not clear favorites".to_string()));
                }
                println!("Favorites cleared");
            }

            AppAction::Subscribe(subscription) => {
                let message = self.api.subscribe(&subscription).await?;
                self.user_data
                    .set(PUSH_ENDPOINT_KEY, &subscription.endpoint)
                    .await;
                println!("{}", message);
            }

            AppAction::Unsubscribe => {
                let Some(endpoint) = self.user_data.get::<String>(PUSH_ENDPOINT_KEY).await else {
                    return Err(AppError::Usage("No push subscription is recorded".to_string()));
                };
                let message = self.api.unsubscribe(&endpoint).await?;
                self.user_data.remove(PUSH_ENDPOINT_KEY).await;
                println!("{}", message);
            }

            AppAction::Open(fragment) => self.open(&fragment).await?,

            AppAction::Status => self.print_status().await,
        }

        Ok(())
    }

    /// Resolve a location fragment through the route guard and render it.
    async fn open(&self, fragment: &str) -> Result<()> {
        let route = match guard(Route::parse(fragment), self.session.is_logged_in()) {
            Access::Allow(route) => route,
            Access::Redirect(target) => {
                ConsoleNavigator.navigate(&target);
                target
            }
        };

        match route {
            Route::Home => self.print_status().await,
            Route::Stories => self.list_stories().await?,
            Route::StoryDetail(id) => {
                self.show_story(&id).await?;
            }
            Route::Favorites => self.list_favorites().await,
            Route::AddStory => println!("story-reader post <photo> <description> [--lat N --lon N]"),
            Route::AddGuestStory => {
                println!("story-reader post <photo> <description> [--lat N --lon N] --guest")
            }
            Route::Login => println!("story-reader login <email> <password>"),
            Route::Register => println!("story-reader register <name> <email> <password>"),
            Route::NotFound => println!("404 - Page not found"),
        }
        Ok(())
    }

    async fn list_stories(&self) -> Result<()> {
        let feed = self.stories.get_cached_or_remote().await?;
        if feed.is_offline() {
            println!("Offline: showing {} cached stories\n", feed.stories.len());
        } else {
            self.mark_synced().await;
        }

        if feed.stories.is_empty() {
            println!("No stories found");
            return Ok(());
        }

        let favorited: HashSet<String> = self
            .favorites
            .list()
            .await
            .into_iter()
            .map(|entry| entry.id().to_string())
            .collect();

        for story in &feed.stories {
            print_story(story, favorited.contains(&story.id));
        }
        Ok(())
    }

    async fn show_story(&self, id: &str) -> Result<Story> {
        let story = match self.stories.get_story(id).await {
            Ok(story) => story,
            // Favorites can outlive the cache.
            Err(e) => match self.favorites.get(id).await {
                Some(entry) => entry.story,
                None => return Err(e),
            },
        };

        print_story(&story, self.favorites.is_favorited(&story.id).await);
        if story.has_location() {
            println!(
                "  location: {:.5}, {:.5}",
                story.lat.unwrap_or_default(),
                story.lon.unwrap_or_default()
            );
        }
        println!("  photo: {}", story.photo_url);
        Ok(story)
    }

    async fn list_favorites(&self) {
        let mut entries = self.favorites.list().await;
        if entries.is_empty() {
            println!("No favorite stories yet");
            return;
        }

        sort_newest_first(&mut entries);
        for entry in &entries {
            print_favorite(entry);
        }
    }

    async fn mark_synced(&self) {
        if !self.user_data.set(LAST_SYNCED_KEY, &Utc::now()).await {
            tracing::debug!("Could not record sync time");
        }
    }

    async fn print_status(&self) {
        let signed_in = if self.session.is_logged_in() { "signed in" } else { "signed out" };
        println!("Session:     {} ({})", signed_in, self.session.path().display());
        println!("Store:       {}", self.store.path().display());

        match self.store.collections().await {
            Ok(collections) => println!("Collections: {}", collections.join(", ")),
            Err(e) => println!("Collections: unavailable ({})", e),
        }

        if self.store.status() == StoreStatus::Unsupported {
            println!("Local storage is unavailable; running online only.");
            return;
        }

        if let Some(user_id) = self.user_data.get::<String>(USER_ID_KEY).await {
            println!("User:        {}", user_id);
        }
        println!("Policy:      {:?}", self.store.recovery_policy());
        println!("Favorites:   {}", self.favorites.count().await);
        println!("Cached:      {}", self.stories.cached().await.len());
        match self.user_data.get::<DateTime<Utc>>(LAST_SYNCED_KEY).await {
            Some(at) => println!("Last sync:   {}", at.format("%Y-%m-%d %H:%M UTC")),
            None => println!("Last sync:   never"),
        }
        println!("Opens:       {}  Rebuilds: {}", self.store.opens(), self.store.rebuilds());
    }
}

fn print_story(story: &Story, favorited: bool) {
    let marker = if favorited { "*" } else { " " };
    println!(
        "{} {}  [{}]  {}",
        marker,
        story.name,
        story.id,
        story.created_at.format("%d %B %Y")
    );
    for line in textwrap::wrap(&story.description, TEXT_WIDTH) {
        println!("    {}", line);
    }
    println!();
}

fn print_favorite(entry: &FavoriteEntry) {
    print_story(&entry.story, true);
    println!("    favorited {}", entry.favorited_at.format("%Y-%m-%d %H:%M"));
    println!();
}
