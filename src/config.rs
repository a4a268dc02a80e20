//! Settings live in a flat `data.json` inside the application directory. The file is optional:
//! anything missing simply disables the part of the daemon that needs it.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const SETTINGS_FILE: &str = "data.json";
pub const DEFAULT_BASE_URL: &str = "https://api.timeular.com/api/v2";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No device address configured")]
    MissingDeviceAddress,
    #[error("No API key/secret configured")]
    MissingCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device_mac: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "apiSecret")]
    pub api_secret: String,
    pub base_url: String,
    /// How long a single wait for a device notification may block.
    pub poll_timeout_ms: u64,
    /// Interval of the elapsed-time ticker.
    pub tick_interval_ms: u64,
    /// Every n-th tick the current tracking is fetched from the remote service.
    pub resync_every: u32,
    /// Orientation has to stay unchanged this long before it is forwarded. 0 disables settling.
    pub debounce_ms: u64,
    pub stop_on_link_loss: bool,
    /// How long a single discovery scans for the device.
    pub scan_window_ms: u64,
    /// Upper bound of one reconnect attempt.
    pub reconnect_timeout_ms: u64,
    /// Pause between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// How long the activity list of the remote service is reused.
    pub activity_cache_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_mac: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            poll_timeout_ms: 1000,
            tick_interval_ms: 2000,
            resync_every: 30,
            debounce_ms: 0,
            stop_on_link_loss: true,
            scan_window_ms: 2000,
            reconnect_timeout_ms: 15000,
            reconnect_delay_ms: 1000,
            activity_cache_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Settings {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE)
    }

    /// Reads settings from `dir`. A missing or corrupted file yields defaults.
    pub fn load(dir: &Path) -> Settings {
        let path = Self::path(dir);
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Settings at {path:?} are malformed, using defaults: {e}");
                Settings::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                warn!("Couldn't read settings at {path:?}, using defaults: {e}");
                Settings::default()
            }
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(Self::path(dir), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn device_address(&self) -> Result<&str, ConfigError> {
        match self.device_mac.trim() {
            "" => Err(ConfigError::MissingDeviceAddress),
            v => Ok(v),
        }
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let api_key = self.api_key.trim();
        let api_secret = self.api_secret.trim();
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(Credentials {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        })
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(100))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms.max(100))
    }

    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnect_timeout_ms.max(self.scan_window_ms).max(100))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn activity_ttl(&self) -> Duration {
        Duration::from_secs(self.activity_cache_secs)
    }
}
