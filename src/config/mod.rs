//! # Configuration Management Module
//!
//! Engine-wide settings loaded from a TOML file:
//!
//! - [`QuestOptions`] - start limit, autostart, autotrack, tracking toggle
//! - [`StorageConfig`] - persistence backend and data directory
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use questline::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("questline.toml").await?;
//!     println!("start limit: {}", config.options.quest_start_limit);
//!     let persistence = config.open_persistence()?;
//!     println!("storage: {}", persistence.name());
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [options]
//! quest_start_limit = 2
//! quest_autostart = false
//! quest_autotrack = false
//! allow_quest_track = true
//!
//! [storage]
//! backend = "sled"
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! file = "questline.log"
//! ```
//!
//! Every section may be omitted; missing values fall back to [`Default`].

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

use crate::storage::{JsonProgressStore, ProgressPersistence, SledProgressStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub options: QuestOptions,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Global quest behaviour toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestOptions {
    /// Maximum number of quests a player may have started at once.
    pub quest_start_limit: usize,
    /// Treat every eligible quest as started without persisting a start.
    pub quest_autostart: bool,
    /// Track quests on start and stop tracking them on completion.
    pub quest_autotrack: bool,
    pub allow_quest_track: bool,
}

impl Default for QuestOptions {
    fn default() -> Self {
        Self {
            quest_start_limit: 2,
            quest_autostart: false,
            quest_autotrack: false,
            allow_quest_track: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sled
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Directory of the sled database, `<data_dir>/progress.sled`.
    pub fn sled_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("progress.sled")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Open the configured persistence backend.
    pub fn open_persistence(&self) -> Result<Arc<dyn ProgressPersistence>> {
        match self.storage.backend {
            StorageBackend::Sled => {
                let path = self.storage.sled_path();
                let store = SledProgressStore::open(&path)
                    .map_err(|e| anyhow!("Failed to open sled store {}: {}", path.display(), e))?;
                Ok(Arc::new(store))
            }
            StorageBackend::Json => {
                let store = JsonProgressStore::open(&self.storage.data_dir).map_err(|e| {
                    anyhow!("Failed to open json store {}: {}", self.storage.data_dir, e)
                })?;
                Ok(Arc::new(store))
            }
        }
    }
}
