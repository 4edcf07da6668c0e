// modules
pub mod constants;
pub mod error;
pub mod http;
pub mod logger;
pub mod platform;
pub mod settings;
pub mod updater;


use log::{info, warn};
use rust_i18n::i18n;
use std::sync::Arc;

pub use error::{AppError, Result};
pub use settings::Settings;
use updater::{parse_login_response, LoginOutcome, UpdateManager, UpdateOrchestrator};

// Initialize internationalization with the "i18n" directory
// - Base directory is the crate root, so translations live in ./i18n/
i18n!("i18n", fallback = "en");

/// Handles one login response end to end.
///
/// A version rejection mounts the update screen, which makes its one
/// automatic attempt when the silent path exists. If that path is missing
/// the installer is handed to the OS instead. Returns the manager so the
/// caller can inspect or keep driving it; `None` when the login was not a
/// version rejection.
pub async fn run_login_flow(
    settings: &Settings,
    status: u16,
    body: &str,
    listener: impl Fn(&str, &updater::UpdateSnapshot) + Send + Sync + 'static,
) -> Result<Option<UpdateManager>> {
    let error = match parse_login_response(status, body) {
        LoginOutcome::VersionBlocked(error) => error,
        LoginOutcome::Accepted(_) => {
            info!("Login accepted, no update required");
            return Ok(None);
        }
        LoginOutcome::Failed { status, message } => {
            warn!("Login failed with status {}: {}", status, message);
            return Err(AppError::General { message });
        }
    };

    let orchestrator = Arc::new(UpdateOrchestrator::from_settings(settings)?);
    let mut manager = UpdateManager::new(error, orchestrator)
        .with_fallback_download_url(settings.fallback_download_url.clone())
        .with_listener(listener);

    let phase = manager.mount().await;
    info!("Update screen settled in phase {}", phase);

    if !manager.phase().is_terminal() && manager.state().error.is_none() {
        manager.manual_download().await?;
    }
    Ok(Some(manager))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepted_login_needs_no_update() {
        let manager = run_login_flow(&Settings::default(), 200, r#"{"token":"t"}"#, |_, _| {})
            .await
            .expect("accepted");
        assert!(manager.is_none());
    }

    #[tokio::test]
    async fn test_failed_login_is_an_error() {
        let result = run_login_flow(
            &Settings::default(),
            401,
            r#"{"detail":"Invalid credentials"}"#,
            |_, _| {},
        )
        .await;
        assert!(matches!(
            result,
            Err(AppError::General { message }) if message == "Invalid credentials"
        ));
    }
}
