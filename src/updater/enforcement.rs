//! Login-time enforcement decision
//!
//! Decides, once per login attempt, whether a client may proceed given the
//! version it reports and the policy for its platform.

use log::{debug, warn};
use rust_i18n::t;
use serde::Serialize;
use std::cmp::Ordering;

use super::types::{Platform, VersionEnforcementError, VersionPolicy};
use super::version;

/// Outcome of evaluating a login against a version policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "details", rename_all = "camelCase")]
pub enum EnforcementDecision {
    Allowed,
    /// Login proceeds but the reported version could not be judged
    AllowedWithWarning { latest_version: String },
    Blocked(VersionEnforcementError),
}

impl EnforcementDecision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, EnforcementDecision::Blocked(_))
    }
}

/// Evaluates `current_version` reported from `platform` against `policy`.
///
/// Never blocks a version it cannot parse: a malformed report under an
/// enforced policy is let through with a warning.
pub fn evaluate(
    current_version: &str,
    platform: Platform,
    policy: &VersionPolicy,
) -> EnforcementDecision {
    if !policy.enforced {
        return EnforcementDecision::Allowed;
    }

    if policy.platform != platform {
        debug!(
            "Policy for {} does not apply to a {} client",
            policy.platform, platform
        );
        return EnforcementDecision::Allowed;
    }

    if !version::is_well_formed(current_version) {
        warn!(
            "Client reported malformed version '{}' on {}, allowing with warning",
            current_version, platform
        );
        return EnforcementDecision::AllowedWithWarning {
            latest_version: policy.latest_version.clone(),
        };
    }

    if version::compare(current_version, &policy.minimum_version) == Ordering::Less {
        warn!(
            "Client version '{}' is below minimum '{}' on {}, update to '{}' required",
            current_version, policy.minimum_version, platform, policy.latest_version
        );
        return EnforcementDecision::Blocked(VersionEnforcementError {
            current_version: current_version.to_string(),
            target_version: policy.latest_version.clone(),
            message: t!("enforcement.update_required").to_string(),
            installer_url: policy.installer_url.clone(),
            silent_install_args: policy.silent_install_args.clone(),
        });
    }

    EnforcementDecision::Allowed
}
