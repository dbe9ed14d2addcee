//! Store configuration.
//!
//! Configuration can be loaded from and saved to a TOML file. Missing keys
//! take their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backup::DEFAULT_BACKUP_SUFFIX;
use crate::profile::{DEFAULT_NICKNAME, DEFAULT_STARTING_COINS};

/// Configuration file name.
pub const CONFIG_FILE: &str = "profile-vault.toml";

/// Application directory name under the platform data directory.
pub const APP_DIR_NAME: &str = "profile-vault";

/// Default primary file name.
pub const DEFAULT_FILE_NAME: &str = "user_profile.json";

/// Autosave scheduling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Whether periodic saving runs at all.
    pub enabled: bool,
    /// Seconds between periodic saves.
    pub interval_secs: f64,
    /// Retries after a failed save before waiting for the next interval.
    pub max_retries: u32,
    /// Seconds between retries.
    pub retry_delay_secs: f64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60.0,
            max_retries: 3,
            retry_delay_secs: 2.0,
        }
    }
}

/// Profile store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the profile, its backup and the install id.
    pub data_dir: PathBuf,
    /// Primary file name inside `data_dir`.
    pub file_name: String,
    /// Suffix appended to the primary file name for the backup.
    pub backup_suffix: String,
    /// Encrypt blobs on save.
    pub encrypt: bool,
    /// Nickname for new profiles and blank-name repairs.
    pub default_nickname: String,
    /// Coins granted to a new profile.
    pub starting_coins: i64,
    /// Autosave settings.
    pub autosave: AutoSaveConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            encrypt: true,
            default_nickname: DEFAULT_NICKNAME.to_string(),
            starting_coins: DEFAULT_STARTING_COINS,
            autosave: AutoSaveConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a default configuration rooted at `data_dir`.
    #[must_use]
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets whether blobs are encrypted.
    #[must_use]
    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    /// Path of the primary profile file.
    #[must_use]
    pub fn primary_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Config file not found, using defaults");
                return Self::default();
            },
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Default configuration file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from(CONFIG_FILE),
            |dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE),
        )
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        if self.file_name.trim().is_empty() {
            self.file_name = DEFAULT_FILE_NAME.to_string();
        }
        if self.backup_suffix.is_empty() {
            self.backup_suffix = DEFAULT_BACKUP_SUFFIX.to_string();
        }
        if self.default_nickname.trim().is_empty() {
            self.default_nickname = DEFAULT_NICKNAME.to_string();
        }
        self.starting_coins = self.starting_coins.max(0);

        // Autosave
        self.autosave.interval_secs = self.autosave.interval_secs.clamp(1.0, 3600.0);
        self.autosave.retry_delay_secs = self.autosave.retry_delay_secs.clamp(0.0, 60.0);
        self.autosave.max_retries = self.autosave.max_retries.min(10);
    }
}

/// Platform data directory, falling back to `./data`.
fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from("data"), |dir| dir.join(APP_DIR_NAME))
}
