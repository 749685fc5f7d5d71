use std::path::PathBuf;

use crate::api::{PushKeys, PushSubscription};
use crate::error::{AppError, Result};

pub const USAGE: &str = r#"Usage: story-reader <command>

Account:
  login <email> <password>
  register <name> <email> <password>
  logout

Stories:
  stories                         list stories (cached copy when offline)
  refresh                         fetch stories and update the cache
  story <id> [--open]             show one story, optionally open its photo
  post <photo> <description> [--lat N --lon N] [--guest]

Favorites:
  fav add <id> | fav remove <id> | fav list | fav count | fav clear

Notifications:
  subscribe <endpoint> <p256dh> <auth>
  unsubscribe

Other:
  open <fragment>                 render a route such as '#/favorites'
  status                          local store and session state
  help
"#;

#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Login {
        email: String,
        password: String,
    },
    Register {
        name: String,
        email: String,
        password: String,
    },
    Logout,
    ListStories,
    RefreshStories,
    ShowStory {
        id: String,
        open_photo: bool,
    },
    PostStory {
        photo: PathBuf,
        description: String,
        location: Option<(f64, f64)>,
        guest: bool,
    },
    AddFavorite(String),
    RemoveFavorite(String),
    ListFavorites,
    CountFavorites,
    ClearFavorites,
    Subscribe(PushSubscription),
    Unsubscribe,
    Open(String),
    Status,
    Help,
}

/// Map command-line arguments (without the program name) to an action.
pub fn parse_args(args: &[String]) -> Result<AppAction> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let action = match args.as_slice() {
        [] | ["help"] | ["--help"] | ["-h"] => AppAction::Help,
        ["login", email, password] => AppAction::Login {
            email: email.to_string(),
            password: password.to_string(),
        },
        ["register", name, email, password] => AppAction::Register {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        },
        ["logout"] => AppAction::Logout,
        ["stories"] => AppAction::ListStories,
        ["refresh"] => AppAction::RefreshStories,
        ["story", id] => AppAction::ShowStory {
            id: id.to_string(),
            open_photo: false,
        },
        ["story", id, "--open"] => AppAction::ShowStory {
            id: id.to_string(),
            open_photo: true,
        },
        ["post", photo, description, rest @ ..] => parse_post(photo, description, rest)?,
        ["fav", "add", id] => AppAction::AddFavorite(id.to_string()),
        ["fav", "remove", id] => AppAction::RemoveFavorite(id.to_string()),
        ["fav", "list"] => AppAction::ListFavorites,
        ["fav", "count"] => AppAction::CountFavorites,
        ["fav", "clear"] => AppAction::ClearFavorites,
        ["subscribe", endpoint, p256dh, auth] => AppAction::Subscribe(PushSubscription {
            endpoint: endpoint.to_string(),
            keys: PushKeys {
                p256dh: p256dh.to_string(),
                auth: auth.to_string(),
            },
        }),
        ["unsubscribe"] => AppAction::Unsubscribe,
        ["open", fragment] => AppAction::Open(fragment.to_string()),
        ["status"] => AppAction::Status,
        _ => {
            return Err(AppError::Usage(format!(
                "unrecognized command: {}\n\n{}",
                args.join(" "),
                USAGE
            )))
        }
    };

    Ok(action)
}

fn parse_post(photo: &str, description: &str, rest: &[&str]) -> Result<AppAction> {
    let mut lat = None;
    let mut lon = None;
    let mut guest = false;

    let mut flags = rest.iter();
    while let Some(flag) = flags.next() {
        match *flag {
            "--guest" => guest = true,
            "--lat" => lat = Some(coordinate("--lat", flags.next())?),
            "--lon" => lon = Some(coordinate("--lon", flags.next())?),
            other => return Err(AppError::Usage(format!("unknown post option {}", other))),
        }
    }

    let location = match (lat, lon) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        (None, None) => None,
        _ => {
            return Err(AppError::Usage(
                "--lat and --lon must be given together".to_string(),
            ))
        }
    };

    Ok(AppAction::PostStory {
        photo: PathBuf::from(photo),
        description: description.to_string(),
        location,
        guest,
    })
}

fn coordinate(flag: &str, value: Option<&&str>) -> Result<f64> {
    let value = value.ok_or_else(|| AppError::Usage(format!("{} needs a value", flag)))?;
    value
        .parse()
        .map_err(|_| AppError::Usage(format!("{} expects a number, got {}", flag, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn no_arguments_shows_help() {
        assert_eq!(parse_args(&[]).unwrap(), AppAction::Help);
    }

    #[test]
    fn parses_favorite_commands() {
        assert_eq!(
            parse_args(&args("fav add s1")).unwrap(),
            AppAction::AddFavorite("s1".to_string())
        );
        assert_eq!(parse_args(&args("fav list")).unwrap(), AppAction::ListFavorites);
        assert_eq!(parse_args(&args("fav clear")).unwrap(), AppAction::ClearFavorites);
    }

    #[test]
    fn parses_post_with_location() {
        let action = parse_args(&args("post sunset.jpg Sunset --lat -6.2 --lon 106.8 --guest")).unwrap();
        assert_eq!(
            action,
            AppAction::PostStory {
                photo: PathBuf::from("sunset.jpg"),
                description: "Sunset".to_string(),
                location: Some((-6.2, 106.8)),
                guest: true,
            }
        );
    }

    #[test]
    fn rejects_half_a_location() {
        let err = parse_args(&args("post a.jpg hi --lat 1.0")).unwrap_err();
        assert!(matches!(err, AppError::Usage(_)));
        let err = parse_args(&args("post a.jpg hi --lat north --lon 1")).unwrap_err();
        assert!(matches!(err, AppError::Usage(_)));
    }

    #[test]
    fn parses_story_flags() {
        assert_eq!(
            parse_args(&args("story abc --open")).unwrap(),
            AppAction::ShowStory {
                id: "abc".to_string(),
                open_photo: true
            }
        );
    }

    #[test]
    fn unknown_command_is_a_usage_error() {
        assert!(matches!(
            parse_args(&args("dance")),
            Err(AppError::Usage(_))
        ));
    }
}
