//! Update system module
//!
//! Gates logins on the client version and, when a login is rejected, drives
//! the client to the required version: silently where the platform allows
//! it, through a manual download otherwise.

mod enforcement;
mod error;
mod login;
mod manager;
#[cfg(test)]
mod manager_test;
mod orchestrator;
mod registry;
mod state_machine;
mod types;
pub mod version;

pub use enforcement::{evaluate, EnforcementDecision};
pub use error::{Result as UpdateResult, UpdateError};
pub use login::{
    enforce_login, parse_login_response, EnforcementSettings, LoginOutcome, VersionRejection,
};
pub use manager::{UpdateListener, UpdateManager, UpdateSnapshot};
pub use orchestrator::{
    HttpInstallerSource, InstallerSource, PlatformIntegration, UpdateOrchestrator,
};
pub use registry::{
    validate_installer_url, ClientVersion, ClientVersionUpdate, NewClientVersion,
    PolicyResolution, VersionRegistry, VersionStatus,
};
pub use state_machine::{UpdateAction, UpdateEvent, UpdateGate, UpdatePhase};
pub use types::*;
