//! Location fragments, the route table and the login guard.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Stories,
    AddStory,
    AddGuestStory,
    StoryDetail(String),
    Favorites,
    Login,
    Register,
    NotFound,
}

impl Route {
    /// Parse a fragment such as `#/stories/abc`. An empty fragment or a
    /// bare `#` is the home route.
    pub fn parse(fragment: &str) -> Self {
        let path = fragment.trim().trim_start_matches('#');
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Route::Home;
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["stories"] => Route::Stories,
            ["stories", "add"] => Route::AddStory,
            ["stories", "guest"] => Route::AddGuestStory,
            ["stories", id] if !id.is_empty() => Route::StoryDetail(id.to_string()),
            ["favorites"] => Route::Favorites,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            _ => Route::NotFound,
        }
    }

    pub fn requires_login(&self) -> bool {
        matches!(self, Route::Stories | Route::AddStory)
    }

    /// Pages that make no sense once signed in.
    pub fn guest_only(&self) -> bool {
        matches!(self, Route::Login | Route::Register | Route::AddGuestStory)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Home => write!(f, "#/"),
            Route::Stories => write!(f, "#/stories"),
            Route::AddStory => write!(f, "#/stories/add"),
            Route::AddGuestStory => write!(f, "#/stories/guest"),
            Route::StoryDetail(id) => write!(f, "#/stories/{}", id),
            Route::Favorites => write!(f, "#/favorites"),
            Route::Login => write!(f, "#/login"),
            Route::Register => write!(f, "#/register"),
            Route::NotFound => write!(f, "#/not-found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow(Route),
    Redirect(Route),
}

pub fn guard(route: Route, logged_in: bool) -> Access {
    if route.requires_login() && !logged_in {
        return Access::Redirect(Route::Login);
    }
    if route.guest_only() && logged_in {
        return Access::Redirect(Route::Stories);
    }
    Access::Allow(route)
}

/// Receives navigation requests issued outside the router, such as the
/// redirect to the login page after signing out.
pub trait Navigator {
    fn navigate(&self, route: &Route);
}
