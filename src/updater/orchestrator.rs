//! Update orchestrator
//!
//! Decides whether a blocked client can upgrade itself in the background and
//! runs that upgrade: download the installer, then hand it to the platform.
//! Nothing here retries on its own; a retry is the caller invoking
//! [`UpdateOrchestrator::perform_silent_upgrade`] again.
//!
//! Installers are only fetched from the configured trusted hosts. When the
//! URL does not name the file type, the downloaded bytes decide it: an OLE
//! compound document is an MSI package, anything else is run as an `.exe`.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use url::Url;

use super::error::{Result, UpdateError};
use super::types::{Platform, UpgradeProgress, VersionEnforcementError};
use crate::constants::DEFAULT_SILENT_INSTALL_ARGS;
use crate::http::{DownloadRequest, HttpClient, Progress, RetryPolicy};
use crate::platform::SystemPlatform;
use crate::settings::Settings;

/// Leading bytes of an OLE compound document, the container MSI packages use
const MSI_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Installer types the platform knows how to run
const INSTALLER_EXTENSIONS: [&str; 2] = ["msi", "exe"];

/// Extension of an installer whose type is not known until it is read
const PENDING_EXTENSION: &str = "download";

/// Where installers come from
#[async_trait]
pub trait InstallerSource: Send + Sync {
    /// Fetches `url` into `destination`, reporting whole percentages
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<()>;
}

/// OS integration needed to finish an upgrade
#[async_trait]
pub trait PlatformIntegration: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether an installer can run unattended on this platform
    fn supports_background_install(&self) -> bool;

    /// Runs the downloaded installer and waits for it to exit
    async fn install(&self, installer: &Path, silent_args: &str) -> Result<()>;

    /// Opens `url` with the OS default handler
    async fn open_url(&self, url: &str) -> Result<()>;
}

/// [`InstallerSource`] backed by the HTTP client
pub struct HttpInstallerSource {
    client: HttpClient,
    timeout: Option<u64>,
    retry_policy: RetryPolicy,
}

impl HttpInstallerSource {
    pub fn new(client: HttpClient, timeout: Option<u64>, retry_policy: RetryPolicy) -> Self {
        Self {
            client,
            timeout,
            retry_policy,
        }
    }
}

#[async_trait]
impl InstallerSource for HttpInstallerSource {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<()> {
        let mut request =
            DownloadRequest::new(url, destination).retry_policy(self.retry_policy.clone());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let mut forward = |progress: Progress| {
            if let Some(percent) = progress.percent() {
                on_progress(percent);
            }
        };
        let bytes = self.client.download(&request, &mut forward).await?;
        info!("Downloaded {} bytes from {} to {:?}", bytes, url, destination);
        Ok(())
    }
}

/// Runs upgrades after a blocked login
pub struct UpdateOrchestrator {
    source: Arc<dyn InstallerSource>,
    platform: Arc<dyn PlatformIntegration>,
    download_dir: PathBuf,
    silent_upgrade_enabled: bool,
    trusted_hosts: Vec<String>,
}

impl UpdateOrchestrator {
    pub fn new(
        source: Arc<dyn InstallerSource>,
        platform: Arc<dyn PlatformIntegration>,
        download_dir: impl Into<PathBuf>,
        silent_upgrade_enabled: bool,
    ) -> Self {
        Self {
            source,
            platform,
            download_dir: download_dir.into(),
            silent_upgrade_enabled,
            trusted_hosts: Vec::new(),
        }
    }

    /// Hosts installers may be downloaded from. Matching is exact and case
    /// insensitive; with no hosts configured nothing is trusted.
    pub fn with_trusted_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.trusted_hosts = hosts
            .into_iter()
            .map(|host| host.as_ref().trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        self
    }

    /// Whether `url` is an http(s) URL on one of the trusted hosts
    pub fn is_trusted_download_url(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .filter(|parsed| matches!(parsed.scheme(), "http" | "https"))
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| self.trusted_hosts.iter().any(|trusted| *trusted == host))
    }

    /// Builds an orchestrator that downloads over HTTP and installs on this OS
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = HttpClient::new().map_err(|e| UpdateError::Config(e.to_string()))?;
        let source = HttpInstallerSource::new(
            client,
            Some(settings.download_timeout_secs),
            settings.retry_policy.clone(),
        );

        Ok(Self::new(
            Arc::new(source),
            Arc::new(SystemPlatform),
            settings.resolve_download_dir()?,
            settings.silent_upgrade_enabled,
        )
        .with_trusted_hosts(&settings.trusted_download_hosts))
    }

    /// Feature flag for unattended upgrades
    pub fn is_silent_upgrade_enabled(&self) -> bool {
        self.silent_upgrade_enabled
    }

    /// True when the platform can install unattended, the rejection carries
    /// an installer URL on a trusted host and the feature flag is on. No side
    /// effects.
    pub fn can_perform_silent_upgrade(&self, error: &VersionEnforcementError) -> bool {
        self.platform.supports_background_install()
            && error
                .installer_url()
                .is_some_and(|url| self.is_trusted_download_url(url))
            && self.is_silent_upgrade_enabled()
    }

    /// Downloads and installs the version named in `error`.
    ///
    /// Reports `Downloading(0..=100)` while fetching, then a single
    /// `Installing` before the installer starts.
    pub async fn perform_silent_upgrade(
        &self,
        error: &VersionEnforcementError,
        on_progress: &mut (dyn FnMut(UpgradeProgress) + Send),
    ) -> Result<()> {
        let url = error.installer_url().ok_or(UpdateError::InstallerUrlMissing)?;
        if !self.is_trusted_download_url(url) {
            warn!("Rejected installer download from untrusted URL {}", url);
            let host = Url::parse(url)
                .ok()
                .and_then(|parsed| parsed.host_str().map(str::to_string))
                .unwrap_or_else(|| url.to_string());
            return Err(UpdateError::UntrustedInstallerHost(host));
        }
        let destination = self.installer_path(url, &error.target_version)?;

        info!(
            "Starting silent upgrade on {} from {} to {} via {}",
            self.platform.platform(),
            error.current_version,
            error.target_version,
            url
        );

        on_progress(UpgradeProgress::Downloading(0));
        let mut forward = |percent: u8| on_progress(UpgradeProgress::Downloading(percent.min(100)));
        self.source
            .fetch(url, &destination, &mut forward)
            .await
            .map_err(|e| match e {
                UpdateError::DownloadFailed(_) => e,
                other => UpdateError::DownloadFailed(other.to_string()),
            })?;

        let destination = match with_installer_extension(&destination).await {
            Ok(path) => path,
            Err(e) => {
                remove_installer(&destination).await;
                return Err(UpdateError::DownloadFailed(e.to_string()));
            }
        };

        on_progress(UpgradeProgress::Installing);
        let args = error
            .silent_install_args
            .as_deref()
            .unwrap_or(DEFAULT_SILENT_INSTALL_ARGS);
        let installed = self
            .platform
            .install(&destination, args)
            .await
            .map_err(|e| match e {
                UpdateError::InstallFailed(_) => e,
                other => UpdateError::InstallFailed(other.to_string()),
            });

        remove_installer(&destination).await;

        installed?;
        info!("Upgrade to {} installed", error.target_version);
        Ok(())
    }

    /// Hands `url` to the OS so the user can download the installer.
    pub async fn open_installer_download(&self, url: &str) -> Result<()> {
        info!("Opening installer download {}", url);
        self.platform.open_url(url).await.map_err(|e| {
            error!("Failed to open installer download {}: {}", url, e);
            e
        })
    }

    /// `<download_dir>/update-<target>.<ext>`, keeping the URL's extension so
    /// the platform can tell an MSI from an executable. URLs without a known
    /// installer extension get `.download`, resolved after the download.
    fn installer_path(&self, url: &str, target_version: &str) -> Result<PathBuf> {
        let parsed = Url::parse(url).map_err(|e| UpdateError::DownloadFailed(e.to_string()))?;
        let extension = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| INSTALLER_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or_else(|| PENDING_EXTENSION.to_string());

        let safe_version: String = target_version
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();

        Ok(self
            .download_dir
            .join(format!("update-{}.{}", safe_version, extension)))
    }
}

async fn remove_installer(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove installer {:?}: {}", path, e);
    }
}

/// Renames a `.download` installer to `.msi` or `.exe` based on its leading
/// bytes. Other paths are returned as is.
async fn with_installer_extension(path: &Path) -> Result<PathBuf> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(PENDING_EXTENSION) {
        return Ok(path.to_path_buf());
    }

    let mut header = [0u8; MSI_MAGIC.len()];
    let mut file = tokio::fs::File::open(path).await?;
    let is_msi = match file.read_exact(&mut header).await {
        Ok(_) => header == MSI_MAGIC,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e.into()),
    };
    drop(file);

    let extension = if is_msi { "msi" } else { "exe" };
    let target = path.with_extension(extension);
    tokio::fs::rename(path, &target).await?;
    debug!("Installer {:?} identified as .{}", target, extension);
    Ok(target)
}
