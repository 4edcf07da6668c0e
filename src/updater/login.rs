//! Version enforcement at login
//!
//! Server side, [`enforce_login`] resolves the reported version against the
//! registry and decides whether the session may be created, producing the
//! HTTP 426 rejection payload when it may not. Client side,
//! [`parse_login_response`] recognises that payload and turns it into the
//! [`VersionEnforcementError`] the update screen is built from.

use log::{info, warn};
use rust_i18n::t;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{PolicyResolution, VersionRegistry, VersionStatus};
use super::types::{Platform, VersionEnforcementError};
use crate::constants::{HTTP_UPGRADE_REQUIRED, VERSION_ENFORCED_REASON};

/// Switches for login-time enforcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementSettings {
    /// Master switch; when off, resolutions are only logged
    pub enforce_enabled: bool,
    pub reject_outdated_enforced: bool,
    pub reject_unknown: bool,
}

impl Default for EnforcementSettings {
    fn default() -> Self {
        Self {
            enforce_enabled: false,
            reject_outdated_enforced: true,
            reject_unknown: false,
        }
    }
}

/// Body of a 426 login rejection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRejection {
    pub reason: String,
    pub target_version: Option<String>,
    pub message: String,
    pub version_status: VersionStatus,
    pub current_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent_install_args: Option<String>,
}

impl VersionRejection {
    pub fn status_code(&self) -> u16 {
        HTTP_UPGRADE_REQUIRED
    }

    /// Response body as the server sends it, wrapped in `detail`
    pub fn to_response_body(&self) -> Value {
        serde_json::json!({ "detail": self })
    }

    pub fn into_enforcement_error(self) -> VersionEnforcementError {
        VersionEnforcementError {
            current_version: self.current_version,
            target_version: self.target_version.unwrap_or_default(),
            message: self.message,
            installer_url: self.installer_url,
            silent_install_args: self.silent_install_args,
        }
    }
}

/// Decides whether a login reporting `app_version` from `platform` may
/// create a session.
///
/// The resolution is returned when the login may proceed so callers can
/// still surface an advisory upgrade.
pub fn enforce_login(
    app_version: &str,
    platform: Platform,
    registry: &VersionRegistry,
    settings: &EnforcementSettings,
) -> Result<PolicyResolution, VersionRejection> {
    let resolution = registry.resolve(app_version, platform);

    match resolution.version_status {
        VersionStatus::Unknown => warn!(
            "Unknown client version '{}' on {}",
            app_version, platform
        ),
        VersionStatus::OutdatedEnforced => warn!(
            "Outdated enforced client version '{}' on {}, target '{}'",
            app_version,
            platform,
            resolution.target_version_string.as_deref().unwrap_or("N/A")
        ),
        _ => {}
    }

    if !settings.enforce_enabled {
        return Ok(resolution);
    }

    let message = match resolution.version_status {
        VersionStatus::OutdatedEnforced if settings.reject_outdated_enforced => {
            t!("enforcement.update_required")
        }
        VersionStatus::Unknown if settings.reject_unknown => t!("enforcement.unknown_version"),
        _ => return Ok(resolution),
    };

    info!(
        "Rejecting login with version '{}' ({}) on {}",
        app_version, resolution.version_status, platform
    );
    Err(VersionRejection {
        reason: VERSION_ENFORCED_REASON.to_string(),
        target_version: resolution.target_version_string,
        message: message.to_string(),
        version_status: resolution.version_status,
        current_version: app_version.to_string(),
        installer_url: resolution.installer_url,
        silent_install_args: resolution.silent_install_args,
    })
}

/// What the client makes of a login response
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Accepted(Value),
    /// Show the blocking update screen
    VersionBlocked(VersionEnforcementError),
    Failed { status: u16, message: String },
}

/// Interprets a login response. A 426 whose body carries the
/// `version_enforced` reason, either under `detail` or at the top level,
/// becomes [`LoginOutcome::VersionBlocked`].
pub fn parse_login_response(status: u16, body: &str) -> LoginOutcome {
    let json: Option<Value> = serde_json::from_str(body).ok();

    if (200..300).contains(&status) {
        return LoginOutcome::Accepted(json.unwrap_or(Value::Null));
    }

    if status == HTTP_UPGRADE_REQUIRED {
        if let Some(rejection) = json.as_ref().and_then(version_rejection) {
            info!(
                "Login blocked: version {} must update to {}",
                rejection.current_version,
                rejection.target_version.as_deref().unwrap_or("unknown")
            );
            return LoginOutcome::VersionBlocked(rejection.into_enforcement_error());
        }
        warn!("426 login response without a version enforcement payload");
    }

    let message = json
        .as_ref()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    LoginOutcome::Failed { status, message }
}

fn version_rejection(body: &Value) -> Option<VersionRejection> {
    let payload = match body.get("detail") {
        Some(detail) if detail.is_object() => detail,
        _ => body,
    };
    if payload.get("reason").and_then(Value::as_str) != Some(VERSION_ENFORCED_REASON) {
        return None;
    }
    serde_json::from_value(payload.clone())
        .map_err(|e| warn!("Malformed version enforcement payload: {}", e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updater::NewClientVersion;
    use serde_json::json;

    fn registry() -> VersionRegistry {
        let mut registry = VersionRegistry::new();
        registry
            .create(NewClientVersion::new("1.0.0", Platform::Windows))
            .expect("1.0.0");
        registry
            .create(
                NewClientVersion::new("1.5.0", Platform::Windows)
                    .enforced(true)
                    .installer_url("https://downloads.example.com/client-1.5.0.msi"),
            )
            .expect("1.5.0");
        registry
    }

    fn enabled() -> EnforcementSettings {
        EnforcementSettings {
            enforce_enabled: true,
            ..EnforcementSettings::default()
        }
    }

    #[test]
    fn test_disabled_switch_never_rejects() {
        let settings = EnforcementSettings {
            reject_unknown: true,
            ..EnforcementSettings::default()
        };
        let resolution =
            enforce_login("1.0.0", Platform::Windows, &registry(), &settings).expect("allowed");
        assert_eq!(resolution.version_status, VersionStatus::OutdatedEnforced);
        assert!(enforce_login("0.0.1", Platform::Windows, &registry(), &settings).is_ok());
    }

    #[test]
    fn test_outdated_enforced_is_rejected_with_installer_metadata() {
        let rejection =
            enforce_login("1.0.0", Platform::Windows, &registry(), &enabled()).expect_err("reject");

        assert_eq!(rejection.status_code(), 426);
        assert_eq!(rejection.reason, VERSION_ENFORCED_REASON);
        assert_eq!(rejection.version_status, VersionStatus::OutdatedEnforced);
        assert_eq!(rejection.target_version.as_deref(), Some("1.5.0"));
        assert_eq!(
            rejection.installer_url.as_deref(),
            Some("https://downloads.example.com/client-1.5.0.msi")
        );
        assert_eq!(rejection.silent_install_args.as_deref(), Some("/qn /norestart"));
        assert_eq!(
            rejection.message,
            "App update required. This version is no longer allowed."
        );
    }

    #[test]
    fn test_unknown_rejected_only_when_configured() {
        assert!(enforce_login("9.9.9", Platform::Windows, &registry(), &enabled()).is_ok());

        let strict = EnforcementSettings {
            reject_unknown: true,
            ..enabled()
        };
        let rejection =
            enforce_login("9.9.9", Platform::Windows, &registry(), &strict).expect_err("reject");
        assert_eq!(rejection.version_status, VersionStatus::Unknown);
        assert_eq!(rejection.target_version, None);
        assert!(rejection.installer_url.is_none());
    }

    #[test]
    fn test_latest_version_passes() {
        let resolution =
            enforce_login("1.5.0", Platform::Windows, &registry(), &enabled()).expect("allowed");
        assert_eq!(resolution.version_status, VersionStatus::Ok);
    }

    #[test]
    fn test_rejection_round_trips_into_update_screen_data() {
        let rejection =
            enforce_login("1.0.0", Platform::Windows, &registry(), &enabled()).expect_err("reject");
        let body = rejection.to_response_body().to_string();

        match parse_login_response(426, &body) {
            LoginOutcome::VersionBlocked(error) => {
                assert_eq!(error.current_version, "1.0.0");
                assert_eq!(error.target_version, "1.5.0");
                assert_eq!(
                    error.installer_url(),
                    Some("https://downloads.example.com/client-1.5.0.msi")
                );
            }
            other => panic!("expected VersionBlocked, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_payload_is_accepted() {
        let body = json!({
            "reason": "version_enforced",
            "target_version": "2.0.0",
            "message": "update",
            "version_status": "outdated_enforced",
            "current_version": "1.0.0"
        })
        .to_string();
        assert!(matches!(
            parse_login_response(426, &body),
            LoginOutcome::VersionBlocked(error) if error.installer_url.is_none()
        ));
    }

    #[test]
    fn test_other_responses() {
        assert_eq!(
            parse_login_response(200, r#"{"token":"abc"}"#),
            LoginOutcome::Accepted(json!({"token": "abc"}))
        );
        assert_eq!(
            parse_login_response(401, r#"{"detail":"Invalid credentials"}"#),
            LoginOutcome::Failed {
                status: 401,
                message: "Invalid credentials".into()
            }
        );
        assert!(matches!(
            parse_login_response(426, r#"{"detail":{"reason":"other"}}"#),
            LoginOutcome::Failed { status: 426, .. }
        ));
        assert!(matches!(
            parse_login_response(502, "Bad Gateway"),
            LoginOutcome::Failed { message, .. } if message == "Bad Gateway"
        ));
    }
}
