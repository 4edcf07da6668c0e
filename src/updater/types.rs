//! Type definitions for the update system
//!
//! Defines the core data structures shared by the evaluator, the
//! orchestrator and the update state machine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Desktop platform a policy applies to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Windows,
    Mac,
    Linux,
}

impl Platform {
    /// The platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Linux
        }
    }
}

/// Server-declared version rule for one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionPolicy {
    pub platform: Platform,
    /// Clients below this version are blocked when `enforced` is set
    pub minimum_version: String,
    /// The version clients are asked to upgrade to
    pub latest_version: String,
    pub enforced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent_install_args: Option<String>,
}

/// A login rejected for version reasons
///
/// Produced once per rejected login and consumed by the update manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEnforcementError {
    pub current_version: String,
    pub target_version: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent_install_args: Option<String>,
}

impl VersionEnforcementError {
    /// Installer URL, ignoring blank values
    pub fn installer_url(&self) -> Option<&str> {
        self.installer_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// View state of the blocking update screen
///
/// Only the update state machine mutates this record; everything else reads
/// snapshots of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateState {
    pub is_update_required: bool,
    pub is_downloading: bool,
    pub is_installing: bool,
    /// 0 to 100
    pub download_progress: u8,
    pub error: Option<String>,
    pub enforcement_data: Option<VersionEnforcementError>,
}

/// Progress reported by the orchestrator while upgrading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeProgress {
    /// Installer download, percentage 0 to 100
    Downloading(u8),
    /// Download finished, installer running
    Installing,
}
