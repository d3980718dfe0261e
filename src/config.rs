//! Configuration loading for agent-msg.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the mailbox root.
pub const HOME_ENV: &str = "AGENT_MSG_HOME";

/// Settings file name inside the mailbox root.
pub const SETTINGS_FILE: &str = "settings.json";

/// Get the default agent-msg home directory (~/.agent-msg).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".agent-msg"))
}

/// Use `explicit` if given, otherwise the default home directory.
pub fn resolve_home_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => get_home_dir(),
    }
}

/// Get the settings file path for a mailbox root.
pub fn get_settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

/// Optional per-installation settings stored next to the mailboxes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Relay used when no URL is given on the command line.
    pub relay_url: Option<String>,
    /// Whether reading the inbox removes messages.
    pub delete_after_read: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            relay_url: None,
            delete_after_read: true,
        }
    }
}

impl Settings {
    /// Pick the relay URL: an explicit one wins over the configured one.
    pub fn relay_url_or(&self, explicit: Option<String>) -> Result<String> {
        explicit.or_else(|| self.relay_url.clone()).ok_or_else(|| {
            Error::Config(format!(
                "No relay URL given. Pass --url or set relay_url in {}.",
                SETTINGS_FILE
            ))
        })
    }
}

/// Load `<root>/settings.json`, falling back to defaults when absent.
pub fn load_settings(root: &Path) -> Result<Settings> {
    let path = get_settings_path(root);

    if !path.exists() {
        tracing::debug!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid settings in {}: {}", path.display(), e)))?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_settings_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = load_settings(temp_dir.path()).unwrap();

        assert_eq!(settings, Settings::default());
        assert!(settings.delete_after_read);
    }

    #[test]
    fn test_partial_settings() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            get_settings_path(temp_dir.path()),
            r#"{"relay_url": "ws://127.0.0.1:9000"}"#,
        )
        .unwrap();

        let settings = load_settings(temp_dir.path()).unwrap();
        assert_eq!(settings.relay_url.as_deref(), Some("ws://127.0.0.1:9000"));
        assert!(settings.delete_after_read);
    }

    #[test]
    fn test_malformed_settings() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(get_settings_path(temp_dir.path()), "{ nope").unwrap();

        let err = load_settings(temp_dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_relay_url_precedence() {
        let settings = Settings {
            relay_url: Some("ws://configured".to_string()),
            ..Settings::default()
        };

        assert_eq!(settings.relay_url_or(Some("ws://flag".to_string())).unwrap(), "ws://flag");
        assert_eq!(settings.relay_url_or(None).unwrap(), "ws://configured");
        assert!(Settings::default().relay_url_or(None).is_err());
    }

    #[test]
    fn test_explicit_home_wins() {
        let path = PathBuf::from("/tmp/agent-msg-test");
        assert_eq!(resolve_home_dir(Some(path.clone())).unwrap(), path);
    }
}
