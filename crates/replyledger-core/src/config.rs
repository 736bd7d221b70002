//! Application configuration.
//!
//! Read from `<config_dir>/replyledger/config.json`; every field has a
//! default so a missing file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Result;

/// Environment variable overriding [`AppConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "REPLYLEDGER_DATA_DIR";

const APP_DIR: &str = "replyledger";

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding `main.db` and the per-auditor stores.
    pub data_dir: PathBuf,
    /// Days to look back on an auditor's first sync.
    pub lookback_days: u32,
    /// Folder holding inbound mail.
    pub inbox_folder: String,
    /// Folder holding outbound mail.
    pub sent_folder: String,
    /// Timeout for establishing a connection, in seconds.
    pub connect_timeout_secs: u64,
    /// Timeout for each protocol exchange, in seconds.
    pub io_timeout_secs: u64,
    /// Optional holiday definition file.
    pub holidays_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lookback_days: 30,
            inbox_folder: "INBOX".to_string(),
            sent_folder: "Sent".to_string(),
            connect_timeout_secs: 30,
            io_timeout_secs: 60,
            holidays_path: None,
        }
    }
}

impl AppConfig {
    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()).await
    }

    /// Load configuration from `path`, applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                info!(path = %path.display(), "Loaded configuration");
                serde_json::from_str(&contents)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV)
            && !dir.trim().is_empty()
        {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Path of the shared admin database.
    #[must_use]
    pub fn admin_db_path(&self) -> PathBuf {
        self.data_dir.join("main.db")
    }

    /// Directory holding the per-auditor stores.
    #[must_use]
    pub fn tenants_dir(&self) -> PathBuf {
        self.data_dir.join("tenants")
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-operation timeout.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
