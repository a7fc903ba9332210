//! Configuration management for jobscout using the prefer crate.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::feed::DEFAULT_FEED_CAPACITY;
use crate::rate_limit::DEFAULT_WINDOW_SECS;
use crate::services::DEFAULT_RECENT_LIMIT;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename (or absolute path).
    pub database_filename: String,
    /// Rate limit backend ("sqlite" = the application database, "memory" = this process only).
    pub rate_limit_backend: Option<String>,
    /// Rate limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Number of recent jobs shown in a summary.
    pub recent_jobs_limit: usize,
    /// Buffered changes per change feed subscriber.
    pub change_feed_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to the platform data dir, e.g. ~/.local/share/jobscout
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("jobscout");

        Self {
            data_dir,
            database_filename: "jobscout.db".to_string(),
            // Counters must outlive a single CLI invocation
            rate_limit_backend: Some("sqlite".to_string()),
            rate_limit_window_secs: DEFAULT_WINDOW_SECS,
            recent_jobs_limit: DEFAULT_RECENT_LIMIT,
            change_feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        if let Some(parent) = self.database_path().parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data (supports `~`).
    #[serde(default)]
    pub target: Option<String>,
    /// Database filename, relative to `target` unless absolute.
    #[serde(default)]
    pub database: Option<String>,
    /// Rate limit backend.
    /// - None or "sqlite": `rate_limits` table in the application database
    /// - "memory": in-process counters (single process)
    #[serde(default)]
    pub rate_limit_backend: Option<String>,
    #[serde(default)]
    pub rate_limit_window_secs: Option<u64>,
    #[serde(default)]
    pub recent_jobs_limit: Option<usize>,
    #[serde(default)]
    pub change_feed_capacity: Option<usize>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers jobscout config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("jobscout").await {
            Ok(pref_config) => {
                let target: Option<String> = pref_config.get("target").ok();
                let database: Option<String> = pref_config.get("database").ok();
                let rate_limit_backend: Option<String> =
                    pref_config.get("rate_limit_backend").ok();
                let rate_limit_window_secs: Option<u64> =
                    pref_config.get("rate_limit_window_secs").ok();
                let recent_jobs_limit: Option<usize> =
                    pref_config.get("recent_jobs_limit").ok();
                let change_feed_capacity: Option<usize> =
                    pref_config.get("change_feed_capacity").ok();

                Config {
                    target,
                    database,
                    rate_limit_backend,
                    rate_limit_window_secs,
                    recent_jobs_limit,
                    change_feed_capacity,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref target) = self.target {
            let path = shellexpand::tilde(target);
            settings.data_dir = PathBuf::from(path.as_ref());
        }
        if let Some(ref database) = self.database {
            settings.database_filename = shellexpand::tilde(database).into_owned();
        }
        if let Some(ref backend) = self.rate_limit_backend {
            settings.rate_limit_backend = Some(backend.clone());
        }
        if let Some(secs) = self.rate_limit_window_secs {
            settings.rate_limit_window_secs = secs;
        }
        if let Some(limit) = self.recent_jobs_limit {
            settings.recent_jobs_limit = limit;
        }
        if let Some(capacity) = self.change_feed_capacity {
            settings.change_feed_capacity = capacity;
        }
    }
}

/// Load settings from configuration.
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}
