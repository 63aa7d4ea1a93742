//! # Configuration Management Module
//!
//! Type-safe TOML configuration for the PA control plane, with defaults
//! that bring up a working single-station instance.
//!
//! ## Sections
//!
//! - [`StationConfig`] - station identity and the zones it addresses
//! - [`ControllerConfig`] - scheduler cadence and startup behavior
//! - [`StorageConfig`] - document store location
//! - [`LoggingConfig`] - level and optional log file
//!
//! ## Configuration File Format
//!
//! ```toml
//! [station]
//! name = "Campus PA"
//! location = "Main Building"
//! zones = ["Lobby", "Cafeteria", "Grounds"]
//!
//! [controller]
//! tick_ms = 1000
//! replay_pending = true
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//! file = "pacast.log"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: String,
    pub location: String,
    /// Zones this station can address; submissions may target a subset.
    #[serde(default)]
    pub zones: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Scheduler loop cadence in milliseconds. The promotion contract is
    /// one due schedule per tick; 1000 is the production value.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Replay schedule documents still marked Pending into the queue at
    /// startup.
    #[serde(default = "default_replay_pending")]
    pub replay_pending: bool,
    /// Maximum announcement content size accepted at the boundary, bytes.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_replay_pending() -> bool {
    true
}

fn default_max_content_bytes() -> usize {
    500
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            tick_ms: default_tick_ms(),
            replay_pending: default_replay_pending(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
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
}

impl Default for Config {
    fn default() -> Self {
        Config {
            station: StationConfig {
                name: "pacast Station".to_string(),
                location: "Your Location".to_string(),
                zones: vec!["All Zones".to_string()],
            },
            controller: ControllerConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("pacast.log".to_string()),
            },
        }
    }
}
