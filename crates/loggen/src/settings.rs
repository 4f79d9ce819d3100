//! File-backed settings store.
//!
//! Settings live in `$HOME/.loggen/config.yaml`. The first time the store is
//! loaded and no file exists, the directory is created and a file with default
//! values is written, so users always have something to edit.
//!
//! ```yaml
//! url: https://qryn.gigapipe.com
//! api_key: ""
//! api_secret: ""
//! labels:
//!   env: staging
//! rate: 100
//! timeout: 30
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_URL: &str = "https://qryn.gigapipe.com";
pub const DEFAULT_RATE: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const SETTINGS_DIR: &str = ".loggen";
const SETTINGS_FILE: &str = "config.yaml";

/// Persistent settings shared by every `loggen` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the ingestion endpoint.
    pub url: String,

    /// Sent as `X-API-Key` when non-empty.
    pub api_key: String,

    /// Sent as `X-API-Secret` when non-empty.
    pub api_secret: String,

    /// Labels attached to every generated stream, sample and span.
    pub labels: BTreeMap<String, String>,

    /// Items per batch.
    pub rate: usize,

    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            labels: BTreeMap::new(),
            rate: DEFAULT_RATE,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Copy suitable for printing: the secret is replaced with asterisks.
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if !masked.api_secret.is_empty() {
            masked.api_secret = "********".to_string();
        }
        masked
    }
}

/// Reads and writes [`Settings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$HOME/.loggen/config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn at_default_path() -> Result<Self> {
        let home = dirs::home_dir().context("unable to locate the home directory")?;
        Ok(Self::new(home.join(SETTINGS_DIR).join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the settings, writing a default file first if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or created.
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            let settings = Settings::default();
            self.save(&settings)?;
            return Ok(settings);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("unable to read config file {}", self.path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", self.path.display()))
    }

    /// Writes `settings`, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("unable to create config directory {}", parent.display())
            })?;
        }

        let raw = serde_yaml::to_string(settings).context("unable to serialize config")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("unable to write config file {}", self.path.display()))
    }

    /// Writes the default settings. Returns `false` without touching the file
    /// if one already exists and `force` is not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn init(&self, force: bool) -> Result<bool> {
        if self.path.exists() && !force {
            return Ok(false);
        }
        self.save(&Settings::default())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let settings = store.load().unwrap();

        assert_eq!(settings, Settings::default());
        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn saved_settings_are_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut settings = Settings::default();
        settings.url = "http://localhost:3100".to_string();
        settings.api_key = "key".to_string();
        settings.labels.insert("env".to_string(), "ci".to_string());
        settings.rate = 7;
        store.save(&settings).unwrap();

        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "rate: 25\nlabels:\n  job: loggen\n").unwrap();

        let settings = store.load().unwrap();

        assert_eq!(settings.rate, 25);
        assert_eq!(settings.url, DEFAULT_URL);
        assert_eq!(settings.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(settings.labels.get("job").map(String::as_str), Some("loggen"));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "rate: [not a number").unwrap();

        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("invalid config file"));
    }

    #[test]
    fn init_respects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut settings = Settings::default();
        settings.rate = 1;
        store.save(&settings).unwrap();

        assert!(!store.init(false).unwrap());
        assert_eq!(store.load().unwrap().rate, 1);

        assert!(store.init(true).unwrap());
        assert_eq!(store.load().unwrap().rate, DEFAULT_RATE);
    }

    #[test]
    fn masked_hides_secret_only() {
        let settings = Settings {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            ..Settings::default()
        };
        let masked = settings.masked();
        assert_eq!(masked.api_key, "key");
        assert_eq!(masked.api_secret, "********");
    }
}
