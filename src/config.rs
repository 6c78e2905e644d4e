//! Configuration loading and management
//!
//! Handles parsing of `lvlup.toml`. The file lives in the platform config
//! directory unless a path is given explicitly; every section is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::notify::{DEFAULT_CHANNEL_ID, DEFAULT_CHANNEL_NAME};

pub const CONFIG_FILE_NAME: &str = "lvlup.toml";
pub const DATABASE_FILE_NAME: &str = "lvlup.db";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database location
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Reminder delivery
    #[serde(default)]
    pub reminders: RemindersConfig,

    /// Live query tuning
    #[serde(default)]
    pub live: LiveConfig,

    /// `lvlup watch` tuning
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Explicit database file; defaults to the platform data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Whether due-date reminders may be armed at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_channel_id")]
    pub channel_id: String,

    #[serde(default = "default_channel_name")]
    pub channel_name: String,
}

fn default_true() -> bool {
    true
}

fn default_channel_id() -> String {
    DEFAULT_CHANNEL_ID.to_string()
}

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_id: default_channel_id(),
            channel_name: default_channel_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// How long a query outlives its last subscriber
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

fn default_grace_period_ms() -> u64 {
    5_000
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl LiveConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between re-reads of the store while watching
    #[serde(default = "default_resync_secs")]
    pub resync_secs: u64,
}

fn default_resync_secs() -> u64 {
    30
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            resync_secs: default_resync_secs(),
        }
    }
}

impl WatchConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "lvlup")
}

impl Config {
    /// Load configuration from a `lvlup.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else the platform config file if it exists,
    /// else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Configured database file, or the platform data directory default.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
            .ok_or_else(|| Error::DatabasePath(PathBuf::from(DATABASE_FILE_NAME)))
    }

    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database.path {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(
                    "database.path cannot be empty".to_string(),
                ));
            }
        }
        if self.reminders.channel_id.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "reminders.channel_id cannot be empty".to_string(),
            ));
        }
        if self.reminders.channel_name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "reminders.channel_name cannot be empty".to_string(),
            ));
        }
        if self.live.grace_period_ms > 600_000 {
            return Err(Error::InvalidConfig(
                "live.grace_period_ms must be <= 600000".to_string(),
            ));
        }
        if self.watch.resync_secs == 0 {
            return Err(Error::InvalidConfig(
                "watch.resync_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert!(cfg.database.path.is_none());
        assert!(cfg.reminders.enabled);
        assert_eq!(cfg.reminders.channel_id, "task_reminder_channel");
        assert_eq!(cfg.reminders.channel_name, "Task Reminders");
        assert_eq!(cfg.live.grace_period(), Duration::from_secs(5));
        assert_eq!(cfg.watch.resync_interval(), Duration::from_secs(30));
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        let content = r#"
[database]
path = "/tmp/elsewhere.db"

[reminders]
enabled = false
channel_id = "quiet"

[live]
grace_period_ms = 250

[watch]
resync_secs = 5
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(
            cfg.database_path().expect("db path"),
            PathBuf::from("/tmp/elsewhere.db")
        );
        assert!(!cfg.reminders.enabled);
        assert_eq!(cfg.reminders.channel_id, "quiet");
        assert_eq!(cfg.reminders.channel_name, "Task Reminders");
        assert_eq!(cfg.live.grace_period(), Duration::from_millis(250));
        assert_eq!(cfg.watch.resync_secs, 5);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "").expect("write config");
        let cfg = Config::load(&path).expect("load config");
        assert!(cfg.reminders.enabled);
        assert_eq!(cfg.live.grace_period_ms, 5_000);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);

        fs::write(&path, "[watch]\nresync_secs = 0\n").expect("write config");
        let err = Config::load(&path).expect_err("zero resync");
        assert!(matches!(err, Error::InvalidConfig(_)));

        fs::write(&path, "[reminders]\nchannel_id = \"  \"\n").expect("write config");
        let err = Config::load(&path).expect_err("blank channel");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn load_reports_toml_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[live\ngrace_period_ms = 1").expect("write config");
        assert!(matches!(Config::load(&path), Err(Error::TomlParse(_))));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        assert!(matches!(Config::resolve(Some(&missing)), Err(Error::Io(_))));
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut cfg = Config::default();
        cfg.reminders.enabled = false;
        cfg.watch.resync_secs = 12;
        cfg.save(&path).expect("save");

        let loaded = Config::load(&path).expect("load");
        assert!(!loaded.reminders.enabled);
        assert_eq!(loaded.watch.resync_secs, 12);
    }
}
