//! Client version registry
//!
//! The administrator-managed list of released desktop versions. Each new
//! version must be strictly greater than the current latest and becomes the
//! latest itself; at most one active version per platform is marked latest.
//! The registry also resolves where a reported version stands and derives
//! the [`VersionPolicy`] the login evaluator applies.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strum::Display;
use url::Url;

use super::error::{Result, UpdateError};
use super::types::{Platform, VersionPolicy};
use super::version::SemanticVersion;
use crate::constants::DEFAULT_SILENT_INSTALL_ARGS;

/// A registered client release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientVersion {
    pub id: u64,
    pub version_string: String,
    pub platform: Platform,
    /// Derived from the semantic version, higher is newer
    pub order_index: u64,
    pub is_latest: bool,
    pub is_enforced: bool,
    pub is_active: bool,
    pub release_notes: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub installer_url: Option<String>,
    pub silent_install_args: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`VersionRegistry::create`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClientVersion {
    pub version_string: String,
    pub platform: Platform,
    #[serde(default)]
    pub is_enforced: bool,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub installer_url: Option<String>,
    #[serde(default = "default_silent_install_args")]
    pub silent_install_args: Option<String>,
}

fn default_silent_install_args() -> Option<String> {
    Some(DEFAULT_SILENT_INSTALL_ARGS.to_string())
}

impl NewClientVersion {
    pub fn new(version_string: impl Into<String>, platform: Platform) -> Self {
        Self {
            version_string: version_string.into(),
            platform,
            is_enforced: false,
            release_notes: None,
            released_at: None,
            installer_url: None,
            silent_install_args: default_silent_install_args(),
        }
    }

    pub fn enforced(mut self, enforced: bool) -> Self {
        self.is_enforced = enforced;
        self
    }

    pub fn installer_url(mut self, url: impl Into<String>) -> Self {
        self.installer_url = Some(url.into());
        self
    }
}

/// Partial update for [`VersionRegistry::update`]; `None` leaves a field as is.
/// The version string and platform never change after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientVersionUpdate {
    pub is_enforced: Option<bool>,
    pub is_active: Option<bool>,
    pub release_notes: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub installer_url: Option<String>,
    pub silent_install_args: Option<String>,
}

/// Where a reported version stands against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VersionStatus {
    /// On the latest, or on an acceptable version
    Ok,
    /// A newer version exists
    Outdated,
    /// A newer, enforced version exists
    OutdatedEnforced,
    /// Not in the registry
    Unknown,
}

/// Result of [`VersionRegistry::resolve`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyResolution {
    pub version_status: VersionStatus,
    pub target_version_id: Option<u64>,
    pub target_version_string: Option<String>,
    pub is_enforced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub silent_install_args: Option<String>,
}

impl PolicyResolution {
    fn unknown() -> Self {
        Self {
            version_status: VersionStatus::Unknown,
            target_version_id: None,
            target_version_string: None,
            is_enforced: false,
            installer_url: None,
            silent_install_args: None,
        }
    }

    fn ok(target: &ClientVersion) -> Self {
        Self {
            version_status: VersionStatus::Ok,
            target_version_id: Some(target.id),
            target_version_string: Some(target.version_string.clone()),
            is_enforced: false,
            installer_url: None,
            silent_install_args: None,
        }
    }
}

/// Trims and checks an installer URL: http or https with a host. Blank
/// input means "no installer".
pub fn validate_installer_url(url: Option<&str>) -> Result<Option<String>> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(None);
    };

    let invalid = |reason: &str| UpdateError::InvalidInstallerUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("must be an HTTP or HTTPS URL"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("must have a valid domain"));
    }
    Ok(Some(url.to_string()))
}

/// In-memory version registry
#[derive(Debug, Default)]
pub struct VersionRegistry {
    versions: Vec<ClientVersion>,
    next_id: u64,
}

impl VersionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions, newest first, optionally filtered
    pub fn list(&self, platform: Option<Platform>, active_only: bool) -> Vec<&ClientVersion> {
        let mut versions: Vec<&ClientVersion> = self
            .versions
            .iter()
            .filter(|v| !active_only || v.is_active)
            .filter(|v| platform.map_or(true, |p| v.platform == p))
            .collect();
        versions.sort_by(|a, b| b.order_index.cmp(&a.order_index));
        versions
    }

    pub fn get(&self, id: u64) -> Option<&ClientVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn get_by_string(&self, version_string: &str, platform: Platform) -> Option<&ClientVersion> {
        self.versions
            .iter()
            .find(|v| v.platform == platform && v.version_string == version_string)
    }

    /// The active version marked latest for `platform`
    pub fn latest(&self, platform: Platform) -> Option<&ClientVersion> {
        self.versions
            .iter()
            .find(|v| v.platform == platform && v.is_active && v.is_latest)
    }

    /// Registers a new release. It must parse as a semantic version, be new
    /// for its platform and be greater than the current latest, which it
    /// replaces.
    pub fn create(&mut self, new: NewClientVersion) -> Result<&ClientVersion> {
        let semver = SemanticVersion::parse(&new.version_string)?;

        if self.get_by_string(&new.version_string, new.platform).is_some() {
            return Err(UpdateError::DuplicateVersion(new.version_string));
        }

        if let Some(latest) = self.latest(new.platform) {
            match SemanticVersion::parse(&latest.version_string) {
                Ok(current) if semver <= current => {
                    return Err(UpdateError::VersionNotGreater {
                        version: new.version_string,
                        latest: latest.version_string.clone(),
                    });
                }
                Ok(_) => {}
                Err(_) => warn!(
                    "Current latest '{}' is not a semantic version, allowing '{}'",
                    latest.version_string, new.version_string
                ),
            }
        }

        let installer_url = validate_installer_url(new.installer_url.as_deref())?;
        self.unset_latest(new.platform);

        let now = Utc::now();
        self.next_id += 1;
        let version = ClientVersion {
            id: self.next_id,
            version_string: new.version_string,
            platform: new.platform,
            order_index: semver.order_index(),
            is_latest: true,
            is_enforced: new.is_enforced,
            is_active: true,
            release_notes: new.release_notes,
            released_at: new.released_at,
            installer_url,
            silent_install_args: new.silent_install_args,
            created_at: now,
            updated_at: now,
        };

        info!(
            "Created client version {} for {} (order_index={}, is_latest=true)",
            version.version_string, version.platform, version.order_index
        );
        self.versions.push(version);
        self.versions
            .last()
            .ok_or_else(|| UpdateError::Config("registry insert failed".to_string()))
    }

    pub fn update(&mut self, id: u64, update: ClientVersionUpdate) -> Result<&ClientVersion> {
        let installer_url = match update.installer_url.as_deref() {
            Some(url) => Some(validate_installer_url(Some(url))?),
            None => None,
        };

        let version = self
            .versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(UpdateError::VersionNotFound(id))?;

        if let Some(enforced) = update.is_enforced {
            version.is_enforced = enforced;
        }
        if let Some(active) = update.is_active {
            version.is_active = active;
        }
        if let Some(notes) = update.release_notes {
            version.release_notes = Some(notes);
        }
        if let Some(released_at) = update.released_at {
            version.released_at = Some(released_at);
        }
        if let Some(url) = installer_url {
            version.installer_url = url;
        }
        if let Some(args) = update.silent_install_args {
            version.silent_install_args = Some(args);
        }
        version.updated_at = Utc::now();

        info!("Updated client version {}", id);
        Ok(version)
    }

    /// Marks `id` latest for its platform, unsetting the previous latest
    pub fn set_latest(&mut self, id: u64) -> Result<&ClientVersion> {
        let platform = self
            .get(id)
            .map(|v| v.platform)
            .ok_or(UpdateError::VersionNotFound(id))?;
        self.unset_latest(platform);

        let version = self
            .versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(UpdateError::VersionNotFound(id))?;
        version.is_latest = true;
        version.updated_at = Utc::now();

        info!(
            "Set version '{}' as latest for {}",
            version.version_string, version.platform
        );
        Ok(version)
    }

    /// Soft delete deactivates and clears the latest and enforced flags,
    /// hard delete removes the record.
    pub fn delete(&mut self, id: u64, hard_delete: bool) -> Result<()> {
        if hard_delete {
            let before = self.versions.len();
            self.versions.retain(|v| v.id != id);
            if self.versions.len() == before {
                return Err(UpdateError::VersionNotFound(id));
            }
            info!("Hard deleted client version {}", id);
            return Ok(());
        }

        let version = self
            .versions
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(UpdateError::VersionNotFound(id))?;
        version.is_active = false;
        version.is_latest = false;
        version.is_enforced = false;
        version.updated_at = Utc::now();
        info!("Soft deleted (deactivated) client version {}", id);
        Ok(())
    }

    fn unset_latest(&mut self, platform: Platform) {
        let now = Utc::now();
        for version in self
            .versions
            .iter_mut()
            .filter(|v| v.platform == platform && v.is_latest)
        {
            version.is_latest = false;
            version.updated_at = now;
        }
    }

    /// Where `client_version` stands for `platform`.
    ///
    /// Lookup is by exact version string among active versions; the order
    /// between the client and the latest comes from `order_index`.
    pub fn resolve(&self, client_version: &str, platform: Platform) -> PolicyResolution {
        let active: Vec<&ClientVersion> = self
            .versions
            .iter()
            .filter(|v| v.platform == platform && v.is_active)
            .collect();

        let Some(client) = active.iter().find(|v| v.version_string == client_version) else {
            debug!(
                "Version '{}' not in registry for {} -> unknown",
                client_version, platform
            );
            return PolicyResolution::unknown();
        };

        let Some(latest) = active.iter().find(|v| v.is_latest) else {
            debug!("No latest version for {}, '{}' is ok", platform, client_version);
            return PolicyResolution::ok(client);
        };

        if client.version_string == latest.version_string {
            return PolicyResolution::ok(latest);
        }

        if client.order_index >= latest.order_index {
            warn!(
                "Client version '{}' ranks at or above latest '{}', treating as ok",
                client_version, latest.version_string
            );
            return PolicyResolution::ok(latest);
        }

        PolicyResolution {
            version_status: if latest.is_enforced {
                VersionStatus::OutdatedEnforced
            } else {
                VersionStatus::Outdated
            },
            target_version_id: Some(latest.id),
            target_version_string: Some(latest.version_string.clone()),
            is_enforced: latest.is_enforced,
            installer_url: latest.installer_url.clone(),
            silent_install_args: latest.silent_install_args.clone(),
        }
    }

    /// The policy clients of `platform` are evaluated against.
    ///
    /// With an enforced latest, everything below it is blocked, so the
    /// minimum is the latest itself.
    pub fn policy_for(&self, platform: Platform) -> Option<VersionPolicy> {
        let latest = self.latest(platform)?;
        let minimum_version = if latest.is_enforced {
            latest.version_string.clone()
        } else {
            self.list(Some(platform), true)
                .last()
                .map_or_else(|| latest.version_string.clone(), |v| v.version_string.clone())
        };

        Some(VersionPolicy {
            platform,
            minimum_version,
            latest_version: latest.version_string.clone(),
            enforced: latest.is_enforced,
            installer_url: latest.installer_url.clone(),
            release_notes: latest.release_notes.clone(),
            silent_install_args: latest.silent_install_args.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(enforced_latest: bool) -> VersionRegistry {
        let mut registry = VersionRegistry::new();
        registry
            .create(NewClientVersion::new("1.0.0", Platform::Windows))
            .expect("1.0.0");
        registry
            .create(
                NewClientVersion::new("2.0.0", Platform::Windows)
                    .enforced(enforced_latest)
                    .installer_url("https://downloads.example.com/client-2.0.0.msi"),
            )
            .expect("2.0.0");
        registry
    }

    #[test]
    fn test_new_version_becomes_the_only_latest() {
        let registry = registry_with(false);
        let latest: Vec<_> = registry
            .list(Some(Platform::Windows), false)
            .into_iter()
            .filter(|v| v.is_latest)
            .collect();

        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].version_string, "2.0.0");
        assert_eq!(
            registry.list(None, true)[0].version_string,
            "2.0.0",
            "list is newest first"
        );
    }

    #[test]
    fn test_downgrade_and_duplicate_are_rejected() {
        let mut registry = registry_with(false);
        assert!(matches!(
            registry.create(NewClientVersion::new("1.5.0", Platform::Windows)),
            Err(UpdateError::VersionNotGreater { .. })
        ));
        assert!(matches!(
            registry.create(NewClientVersion::new("2.0.0", Platform::Windows)),
            Err(UpdateError::DuplicateVersion(_))
        ));
        assert!(matches!(
            registry.create(NewClientVersion::new("2.1", Platform::Windows)),
            Err(UpdateError::MalformedVersionString(_))
        ));
        // other platforms keep their own latest
        assert!(registry
            .create(NewClientVersion::new("1.0.0", Platform::Mac))
            .is_ok());
        assert_eq!(
            registry
                .latest(Platform::Windows)
                .map(|v| v.version_string.as_str()),
            Some("2.0.0")
        );
    }

    #[test]
    fn test_oversized_version_is_rejected_not_indexed() {
        let mut registry = VersionRegistry::new();
        assert!(matches!(
            registry.create(NewClientVersion::new("200000000000.0.0", Platform::Windows)),
            Err(UpdateError::MalformedVersionString(_))
        ));
        assert!(registry.list(None, false).is_empty());
    }

    #[test]
    fn test_installer_url_validation() {
        assert_eq!(validate_installer_url(Some("   ")).expect("blank"), None);
        assert_eq!(
            validate_installer_url(Some(" https://example.com/a.msi ")).expect("valid"),
            Some("https://example.com/a.msi".to_string())
        );
        assert!(validate_installer_url(Some("ftp://example.com/a.msi")).is_err());
        assert!(validate_installer_url(Some("not a url")).is_err());

        let mut registry = VersionRegistry::new();
        assert!(matches!(
            registry.create(
                NewClientVersion::new("1.0.0", Platform::Windows).installer_url("file:///tmp/x")
            ),
            Err(UpdateError::InvalidInstallerUrl { .. })
        ));
    }

    #[test]
    fn test_set_latest_moves_the_flag() {
        let mut registry = registry_with(false);
        let old_id = registry
            .get_by_string("1.0.0", Platform::Windows)
            .expect("old")
            .id;

        registry.set_latest(old_id).expect("set latest");
        assert_eq!(registry.latest(Platform::Windows).map(|v| v.id), Some(old_id));
        assert_eq!(
            registry
                .list(Some(Platform::Windows), true)
                .iter()
                .filter(|v| v.is_latest)
                .count(),
            1
        );
        assert!(matches!(
            registry.set_latest(99),
            Err(UpdateError::VersionNotFound(99))
        ));
    }

    #[test]
    fn test_soft_and_hard_delete() {
        let mut registry = registry_with(true);
        let id = registry.latest(Platform::Windows).expect("latest").id;

        registry.delete(id, false).expect("soft delete");
        let deleted = registry.get(id).expect("still stored");
        assert!(!deleted.is_active && !deleted.is_latest && !deleted.is_enforced);
        assert!(registry.latest(Platform::Windows).is_none());

        registry.delete(id, true).expect("hard delete");
        assert!(registry.get(id).is_none());
        assert!(registry.delete(id, true).is_err());
    }

    #[test]
    fn test_update_changes_only_given_fields() {
        let mut registry = registry_with(false);
        let id = registry.latest(Platform::Windows).expect("latest").id;

        let updated = registry
            .update(
                id,
                ClientVersionUpdate {
                    is_enforced: Some(true),
                    release_notes: Some("Security fixes".into()),
                    ..ClientVersionUpdate::default()
                },
            )
            .expect("update");
        assert!(updated.is_enforced);
        assert_eq!(updated.release_notes.as_deref(), Some("Security fixes"));
        assert_eq!(
            updated.installer_url.as_deref(),
            Some("https://downloads.example.com/client-2.0.0.msi")
        );
        assert_eq!(
            updated.silent_install_args.as_deref(),
            Some(DEFAULT_SILENT_INSTALL_ARGS)
        );
    }

    #[test]
    fn test_resolution_statuses() {
        let registry = registry_with(false);
        assert_eq!(
            registry.resolve("2.0.0", Platform::Windows).version_status,
            VersionStatus::Ok
        );
        assert_eq!(
            registry.resolve("9.9.9", Platform::Windows).version_status,
            VersionStatus::Unknown
        );
        assert_eq!(
            registry.resolve("1.0.0", Platform::Linux).version_status,
            VersionStatus::Unknown
        );

        let outdated = registry.resolve("1.0.0", Platform::Windows);
        assert_eq!(outdated.version_status, VersionStatus::Outdated);
        assert!(!outdated.is_enforced);
        assert_eq!(outdated.target_version_string.as_deref(), Some("2.0.0"));

        let enforced = registry_with(true).resolve("1.0.0", Platform::Windows);
        assert_eq!(enforced.version_status, VersionStatus::OutdatedEnforced);
        assert!(enforced.is_enforced);
        assert_eq!(
            enforced.installer_url.as_deref(),
            Some("https://downloads.example.com/client-2.0.0.msi")
        );
    }

    #[test]
    fn test_policy_for_platform() {
        let policy = registry_with(true)
            .policy_for(Platform::Windows)
            .expect("policy");
        assert!(policy.enforced);
        assert_eq!(policy.minimum_version, "2.0.0");
        assert_eq!(policy.latest_version, "2.0.0");

        let relaxed = registry_with(false)
            .policy_for(Platform::Windows)
            .expect("policy");
        assert!(!relaxed.enforced);
        assert_eq!(relaxed.minimum_version, "1.0.0");

        assert!(VersionRegistry::new().policy_for(Platform::Mac).is_none());
    }
}
