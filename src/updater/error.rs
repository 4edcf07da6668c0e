//! Error types for the update process
//!
//! Defines the error types that can occur while gating a login on the client
//! version, managing the version registry, and running an upgrade.

use rust_i18n::t;
use serde::Serialize;

/// Errors that can occur during the update process
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum UpdateError {
    /// A version string could not be parsed
    #[error("{}", t!("updater.malformed_version", version = _0))]
    MalformedVersionString(String),

    /// Network or IO failure while fetching the installer
    #[error("{}", t!("updater.download_failed", error = _0))]
    DownloadFailed(String),

    /// The platform install step failed
    #[error("{}", t!("updater.install_failed", error = _0))]
    InstallFailed(String),

    /// The enforcement payload carries no installer URL
    #[error("{}", t!("updater.installer_url_missing"))]
    InstallerUrlMissing,

    /// The state machine refused an event in its current phase
    #[error("{}", t!("updater.invalid_transition", event = event, phase = phase))]
    InvalidTransition { phase: String, event: String },

    /// Version string already registered for the platform
    #[error("{}", t!("updater.duplicate_version", version = _0))]
    DuplicateVersion(String),

    /// New registry entry is not above the current latest
    #[error("{}", t!("updater.version_not_greater", version = version, latest = latest))]
    VersionNotGreater { version: String, latest: String },

    /// Installer URL is not a usable http(s) URL
    #[error("{}", t!("updater.invalid_installer_url", url = url, reason = reason))]
    InvalidInstallerUrl { url: String, reason: String },

    /// Registry lookup by id failed
    #[error("{}", t!("updater.version_not_found", id = _0))]
    VersionNotFound(u64),

    /// Installer URL points at a host outside the trusted list
    #[error("{}", t!("updater.untrusted_installer_host", host = _0))]
    UntrustedInstallerHost(String),

    /// The OS refused to open a URL
    #[error("{}", t!("updater.open_url_failed", url = url, error = error))]
    OpenUrlFailed { url: String, error: String },

    /// Configuration error
    #[error("{0}")]
    Config(String),

    /// Filesystem error
    #[error("{0}")]
    Io(String),
}

impl From<std::io::Error> for UpdateError {
    fn from(err: std::io::Error) -> Self {
        UpdateError::Io(err.to_string())
    }
}

impl From<crate::http::HttpError> for UpdateError {
    fn from(err: crate::http::HttpError) -> Self {
        UpdateError::DownloadFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
