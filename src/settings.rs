//! Persistent settings
//!
//! Settings live in `settings.json` under the platform config directory.
//! Every field has a default, so a missing or partial file is fine.

use log::{error, info};
use rust_i18n::t;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::constants::*;
use crate::http::RetryPolicy;
use crate::updater::{EnforcementSettings, UpdateError};

/// Settings module errors
#[derive(Error, Debug, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum SettingsError {
    #[error("{}", t!("settings.read_failed", path = path, error = error))]
    Read { path: String, error: String },
    #[error("{}", t!("settings.parse_failed", path = path, error = error))]
    Parse { path: String, error: String },
    #[error("{}", t!("settings.write_failed", path = path, error = error))]
    Write { path: String, error: String },
    #[error("{}", t!("settings.no_config_dir"))]
    NoConfigDir,
    #[error("{}", t!("settings.unknown_key", key = _0))]
    UnknownKey(String),
    #[error("{}", t!("settings.invalid_value", key = key, error = error))]
    InvalidValue { key: String, error: String },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Feature flag for unattended upgrades
    pub silent_upgrade_enabled: bool,
    pub interface_language: String,
    /// Where installers are downloaded, defaults to the cache dir
    pub download_dir: Option<PathBuf>,
    pub download_timeout_secs: u64,
    pub retry_policy: RetryPolicy,
    /// Download page used when a rejection carries no installer URL
    pub fallback_download_url: Option<String>,
    /// Hosts silent upgrades may download installers from; empty trusts none
    pub trusted_download_hosts: Vec<String>,
    /// Server-side login enforcement switches
    pub enforcement: EnforcementSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            silent_upgrade_enabled: true,
            interface_language: DEFAULT_INTERFACE_LANGUAGE.to_string(),
            download_dir: None,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            retry_policy: RetryPolicy::default(),
            fallback_download_url: None,
            trusted_download_hosts: Vec::new(),
            enforcement: EnforcementSettings::default(),
        }
    }
}

impl Settings {
    /// `<config_dir>/version-gate/settings.json`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Loads settings from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> SettingsResult<Self> {
        if !path.exists() {
            info!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| {
            error!("Failed to parse settings {:?}: {}", path, e);
            SettingsError::Parse {
                path: path.display().to_string(),
                error: e.to_string(),
            }
        })
    }

    pub fn save(&self, path: &Path) -> SettingsResult<()> {
        let write_err = |e: String| SettingsError::Write {
            path: path.display().to_string(),
            error: e,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| write_err(e.to_string()))
    }

    /// Sets a single setting by key. The value is JSON, as it would appear
    /// in the settings file.
    pub fn set_config(&mut self, key: &str, value: &Value) -> SettingsResult<()> {
        let invalid = |e: serde_json::Error| SettingsError::InvalidValue {
            key: key.to_string(),
            error: e.to_string(),
        };

        match key {
            CFG_SILENT_UPGRADE => {
                self.silent_upgrade_enabled = serde_json::from_value(value.clone()).map_err(invalid)?
            }
            CFG_INTERFACE_LANGUAGE => {
                self.interface_language = serde_json::from_value(value.clone()).map_err(invalid)?
            }
            CFG_DOWNLOAD_DIR => {
                self.download_dir = serde_json::from_value(value.clone()).map_err(invalid)?
            }
            CFG_DOWNLOAD_TIMEOUT => {
                self.download_timeout_secs =
                    serde_json::from_value(value.clone()).map_err(invalid)?
            }
            CFG_FALLBACK_DOWNLOAD_URL => {
                self.fallback_download_url =
                    serde_json::from_value(value.clone()).map_err(invalid)?
            }
            CFG_TRUSTED_DOWNLOAD_HOSTS => {
                self.trusted_download_hosts =
                    serde_json::from_value(value.clone()).map_err(invalid)?
            }
            CFG_ENFORCEMENT => {
                self.enforcement = serde_json::from_value(value.clone()).map_err(invalid)?
            }
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Download directory, falling back to `<cache_dir>/version-gate/updates`
    pub fn resolve_download_dir(&self) -> Result<PathBuf, UpdateError> {
        if let Some(dir) = &self.download_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join("updates"))
            .ok_or_else(|| UpdateError::Config(t!("settings.no_config_dir").to_string()))
    }
}
