use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::Result;
use crate::routes::{Navigator, Route};

/// Key of the token slot in the session file.
const AUTH_KEY: &str = "story_auth";

/// The bearer token, kept in its own small file so it survives whatever
/// happens to the story database.
pub struct Session {
    path: PathBuf,
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let token = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(slots) => slots.get(AUTH_KEY).filter(|t| !t.is_empty()).cloned(),
                Err(e) => {
                    tracing::warn!(
                        "Ignoring unreadable session file {}: {}",
                        path.display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            path,
            token: RwLock::new(token),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    pub fn set_token(&self, token: &str) -> Result<()> {
        let mut slots = BTreeMap::new();
        slots.insert(AUTH_KEY.to_string(), token.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&slots)?)?;

        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
        Ok(())
    }

    pub fn remove_token(&self) -> Result<()> {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;

        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Sign out and send the user to the login page.
    pub fn clear(&self, navigator: &dyn Navigator) -> Result<()> {
        self.remove_token()?;
        tracing::info!("Signed out");
        navigator.navigate(&Route::Login);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        visited: RefCell<Vec<Route>>,
    }

    impl Navigator for Recorder {
        fn navigate(&self, route: &Route) {
            self.visited.borrow_mut().push(route.clone());
        }
    }

    #[test]
    fn starts_logged_out_without_a_file() {
        let dir = TempDir::new().unwrap();
        let session = Session::load(dir.path().join("session.json")).unwrap();
        assert!(!session.is_logged_in());
        assert_eq!(session.token(), None);
    }

    #[test]
    fn token_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let session = Session::load(&path).unwrap();
        session.set_token("eyJhbGciOi").unwrap();
        assert!(session.is_logged_in());

        let reloaded = Session::load(&path).unwrap();
        assert_eq!(reloaded.token().as_deref(), Some("eyJhbGciOi"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("story_auth"));
    }

    #[test]
    fn clear_removes_token_and_navigates_to_login() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let session = Session::load(&path).unwrap();
        session.set_token("token").unwrap();

        let recorder = Recorder::default();
        session.clear(&recorder).unwrap();

        assert!(!session.is_logged_in());
        assert!(!path.exists());
        assert_eq!(*recorder.visited.borrow(), vec![Route::Login]);
        assert!(!Session::load(&path).unwrap().is_logged_in());
    }

    #[test]
    fn unreadable_file_means_logged_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        for content in ["", "{\"story_auth\": \"tok", "not json"] {
            std::fs::write(&path, content).unwrap();
            let session = Session::load(&path).unwrap();
            assert!(!session.is_logged_in(), "content {:?}", content);
        }

        // Logging in again replaces the damaged file.
        let session = Session::load(&path).unwrap();
        session.set_token("fresh").unwrap();
        assert_eq!(Session::load(&path).unwrap().token().as_deref(), Some("fresh"));
    }

    #[test]
    fn removing_twice_is_fine() {
        let dir = TempDir::new().unwrap();
        let session = Session::load(dir.path().join("session.json")).unwrap();
        session.remove_token().unwrap();
        session.remove_token().unwrap();
    }
}
