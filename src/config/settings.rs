// Configuration structs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::constants::{DEFAULT_HTTP_ADDR, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_LOG_DIR};
use crate::logging::StoreConfig;
use crate::model::{MODEL_VERSION, MODEL_VERSION_NOTE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the train/predict partition files
    pub log_dir: PathBuf,

    /// Bind address for `serve` (e.g. "127.0.0.1:4000")
    pub bind_address: String,

    /// Bounded wait for a contended partition lock, in milliseconds
    pub lock_timeout_ms: u64,

    /// Version stamped on every logged event
    pub model_version: String,

    /// Free-text note stamped on train events
    pub model_version_note: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            bind_address: DEFAULT_HTTP_ADDR.to_string(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            model_version: MODEL_VERSION.to_string(),
            model_version_note: MODEL_VERSION_NOTE.to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.log_dir.as_os_str().is_empty() {
            bail!("log_dir must not be empty");
        }
        if self.lock_timeout_ms == 0 {
            bail!("lock_timeout_ms must be greater than zero");
        }
        if self.model_version.trim().is_empty() {
            bail!("model_version must not be empty");
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            log_dir: self.log_dir.clone(),
            lock_timeout: self.lock_timeout(),
        }
    }
}
