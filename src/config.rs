//! remindd configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main remindd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daemon file locations
    pub daemon: DaemonConfig,

    /// Reminder store settings
    pub store: StoreConfig,

    /// Delivery retry configuration
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Check the loaded values are usable
    ///
    /// Runs once at daemon startup so bad values surface before anything binds.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.delivery_attempts == 0 {
            return Err(eyre::eyre!(
                "dispatch.delivery-attempts must be at least 1"
            ));
        }
        Ok(())
    }

    /// Resolve config from the first source that works
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path: no fallback behind it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .remindd.yml
        let local_config = PathBuf::from(".remindd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Skipping unreadable config {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/remindd/remindd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("remindd").join("remindd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable config {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found; using built-in defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Could not read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Could not parse config file")?;

        tracing::info!("Config loaded from {}", path.as_ref().display());
        Ok(config)
    }
}

/// Daemon file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log file path
    #[serde(rename = "log-file")]
    pub log_file: PathBuf,

    /// PID file path
    #[serde(rename = "pid-file")]
    pub pid_file: PathBuf,

    /// Unix socket path for the control surface
    #[serde(rename = "socket-path")]
    pub socket_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            log_file: data_dir.join("remindd.log"),
            pid_file: data_dir.join("remindd.pid"),
            socket_path: crate::ipc::get_socket_path(),
        }
    }
}

/// Reminder store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: data_dir().join("remindd.db"),
        }
    }
}

/// Delivery retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delivery attempts per firing before giving up
    #[serde(rename = "delivery-attempts")]
    pub delivery_attempts: u32,

    /// Fixed backoff between delivery attempts in seconds
    #[serde(rename = "retry-backoff-secs")]
    pub retry_backoff_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delivery_attempts: 3,
            retry_backoff_secs: 30,
        }
    }
}

impl DispatchConfig {
    /// Get the retry backoff as a Duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// Data directory for daemon state (~/.local/share/remindd on Linux)
fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("remindd"))
        .unwrap_or_else(|| PathBuf::from(".remindd"))
}
