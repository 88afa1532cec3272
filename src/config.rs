use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://yt2certify.onrender.com";

/// Tunables for the tracker. Every field has a default so a partial JSON
/// file is enough.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    pub api_base: String,
    pub checkpoint_count: usize,
    pub challenge_seconds: u32,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub navigation_debounce_ms: u64,
    pub init_settle_ms: u64,
    pub metadata_settle_ms: u64,
    pub request_timeout_ms: u64,
    pub db_path: Option<PathBuf>,
    pub debug: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            checkpoint_count: 5,
            challenge_seconds: 5,
            retry_attempts: 3,
            retry_delay_ms: 800,
            navigation_debounce_ms: 300,
            init_settle_ms: 400,
            metadata_settle_ms: 800,
            request_timeout_ms: 15_000,
            db_path: None,
            debug: false,
        }
    }
}

impl TrackerConfig {
    /// Reads `path` when it exists, falling back to defaults, then applies
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config at {}", path.display()))?
        } else {
            info!("No config at {}, using defaults", path.display());
            Self::default()
        };

        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(api_base) = env::var("CERTIFLEX_API_BASE") {
            if api_base.trim().is_empty() {
                warn!("CERTIFLEX_API_BASE is empty, keeping {}", self.api_base);
            } else {
                self.api_base = api_base.trim().trim_end_matches('/').to_string();
            }
        }

        if let Ok(db_path) = env::var("CERTIFLEX_DB_PATH") {
            self.db_path = Some(PathBuf::from(db_path));
        }

        if let Ok(value) = env::var("CERTIFLEX_DEBUG") {
            self.debug = value == "1" || value.eq_ignore_ascii_case("true");
        }

        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn navigation_debounce(&self) -> Duration {
        Duration::from_millis(self.navigation_debounce_ms)
    }

    pub fn init_settle(&self) -> Duration {
        Duration::from_millis(self.init_settle_ms)
    }

    pub fn metadata_settle(&self) -> Duration {
        Duration::from_millis(self.metadata_settle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
