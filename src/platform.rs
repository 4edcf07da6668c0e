//! OS integration for upgrades
//!
//! Runs downloaded installers and opens URLs with the system handler. Only
//! Windows installers (MSI through `msiexec`, or a plain `.exe`) can run
//! unattended; on other platforms the user is sent to the download page.

use async_trait::async_trait;
use rust_i18n::t;
use std::path::Path;
use tokio::process::Command;

use crate::updater::{Platform, PlatformIntegration, UpdateError, UpdateResult};

/// The platform this process runs on
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPlatform;

/// Builds the installer command line for `installer`
///
/// MSI packages go through `msiexec /i`, executables are launched directly.
/// Anything else cannot be installed unattended.
fn installer_command(installer: &Path, silent_args: &str) -> UpdateResult<Command> {
    let extension = installer
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let mut cmd = match extension.as_deref() {
        Some("msi") => {
            let mut cmd = Command::new("msiexec");
            cmd.arg("/i").arg(installer);
            cmd
        }
        Some("exe") => Command::new(installer),
        _ => {
            return Err(UpdateError::InstallFailed(format!(
                "unsupported installer type: {}",
                installer.display()
            )))
        }
    };
    cmd.args(silent_args.split_whitespace());
    Ok(cmd)
}

#[async_trait]
impl PlatformIntegration for SystemPlatform {
    fn platform(&self) -> Platform {
        Platform::current()
    }

    fn supports_background_install(&self) -> bool {
        self.platform() == Platform::Windows
    }

    async fn install(&self, installer: &Path, silent_args: &str) -> UpdateResult<()> {
        let mut cmd = installer_command(installer, silent_args)?;
        log::info!("Launching installer: {:?}", cmd);

        let status = cmd
            .status()
            .await
            .map_err(|e| UpdateError::InstallFailed(e.to_string()))?;

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(UpdateError::InstallFailed(
                t!("updater.installer_exit_code", code = code).to_string(),
            ));
        }
        Ok(())
    }

    async fn open_url(&self, url: &str) -> UpdateResult<()> {
        open::that_detached(url).map_err(|e| UpdateError::OpenUrlFailed {
            url: url.to_string(),
            error: e.to_string(),
        })
    }
}
