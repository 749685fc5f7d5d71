use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::{RecoveryPolicy, RetryPolicy, StoreSettings};
use crate::error::{AppError, Result};

const APP_DIR: &str = "story-reader";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_session_path")]
    pub session_path: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Set to false to run without any local storage.
    #[serde(default = "default_persistence_enabled")]
    pub persistence_enabled: bool,

    #[serde(default)]
    pub recovery_policy: RecoveryPolicy,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_db_path() -> String {
    data_dir().join("stories.db").to_string_lossy().to_string()
}

fn default_session_path() -> String {
    data_dir().join("session.json").to_string_lossy().to_string()
}

fn default_api_base_url() -> String {
    "https://story-api.dicoding.dev/v1".to_string()
}

fn default_persistence_enabled() -> bool {
    true
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            session_path: default_session_path(),
            api_base_url: default_api_base_url(),
            persistence_enabled: default_persistence_enabled(),
            recovery_policy: RecoveryPolicy::default(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api_base_url).map_err(|e| {
            AppError::Config(format!("invalid api_base_url {:?}: {}", self.api_base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "api_base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.retry_max_attempts == 0 {
            return Err(AppError::Config(
                "retry_max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            path: PathBuf::from(&self.db_path),
            enabled: self.persistence_enabled,
            recovery: self.recovery_policy,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.api_base_url, "https://story-api.dicoding.dev/v1");
        assert!(config.persistence_enabled);
        assert_eq!(config.recovery_policy, RecoveryPolicy::Rebuild);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.db_path.ends_with("stories.db"));
    }

    #[test]
    fn reads_overrides() {
        let config = Config::parse(
            r#"
            db_path = "/tmp/s.db"
            persistence_enabled = false
            recovery_policy = "migrate"
            retry_max_attempts = 5
            retry_base_delay_ms = 250
            "#,
        )
        .unwrap();

        let settings = config.store_settings();
        assert_eq!(settings.path, PathBuf::from("/tmp/s.db"));
        assert!(!settings.enabled);
        assert_eq!(settings.recovery, RecoveryPolicy::Migrate);
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry_policy().delay_after(2), Duration::from_millis(500));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::parse(r#"api_base_url = "not a url""#),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            Config::parse(r#"api_base_url = "ftp://example.com""#),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            Config::parse("retry_max_attempts = 0"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            Config::parse(r#"recovery_policy = "pray""#),
            Err(AppError::TomlParse(_))
        ));
    }

    #[test]
    fn saved_form_parses_back() {
        let config = Config::default();
        let content = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::parse(&content).unwrap();
        assert_eq!(parsed.db_path, config.db_path);
        assert_eq!(parsed.recovery_policy, config.recovery_policy);
    }
}
