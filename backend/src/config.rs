//! Server configuration.
//!
//! Read from the JSON file named by `ROUNDPRINT_CONFIG`, or `roundprint.json`
//! in the working directory. Every field is optional in the file. A missing
//! file means defaults; a broken one is logged and ignored.

use common::model::batch::BatchSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "ROUNDPRINT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "roundprint.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for the total size of one multipart upload.
    pub max_upload_bytes: usize,
    pub job_channel_capacity: usize,
    /// How long a finished job and its undownloaded archive are kept.
    pub job_retention_secs: u64,
    /// Used when a batch request carries no `settings` part.
    pub default_settings: Option<BatchSettings>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_upload_bytes: 256 * 1024 * 1024,
            job_channel_capacity: 100,
            job_retention_secs: 3600,
            default_settings: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    /// How often expired jobs are looked for: every minute, or more often
    /// when the retention is shorter. Never zero.
    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs.clamp(1, 60))
    }
}

/// Path of the configuration file to use.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn load_config() -> ServerConfig {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> ServerConfig {
    if !path.exists() {
        log::info!("No config file at {}. Using defaults.", path.display());
        return ServerConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(config) => {
                log::info!("Config loaded from: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to parse config file: {}. Using defaults.", e);
                ServerConfig::default()
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file: {}. Using defaults.", e);
            ServerConfig::default()
        }
    }
}
