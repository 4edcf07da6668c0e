// Settings keys, persisted in settings.json
pub const CFG_SILENT_UPGRADE: &str = "silent_upgrade_enabled";
pub const CFG_INTERFACE_LANGUAGE: &str = "interface_language";
pub const CFG_DOWNLOAD_DIR: &str = "download_dir";
pub const CFG_DOWNLOAD_TIMEOUT: &str = "download_timeout_secs";
pub const CFG_FALLBACK_DOWNLOAD_URL: &str = "fallback_download_url";
pub const CFG_TRUSTED_DOWNLOAD_HOSTS: &str = "trusted_download_hosts";
pub const CFG_ENFORCEMENT: &str = "enforcement";

pub const APP_DIR_NAME: &str = "version-gate";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const LOG_FILE_NAME: &str = "version-gate.log";

pub const DEFAULT_INTERFACE_LANGUAGE: &str = "en";
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

// MSI arguments used when the registry entry does not carry its own
pub const DEFAULT_SILENT_INSTALL_ARGS: &str = "/qn /norestart";

// Value of `reason` in a 426 login rejection
pub const VERSION_ENFORCED_REASON: &str = "version_enforced";
pub const HTTP_UPGRADE_REQUIRED: u16 = 426;

// Events published by the update manager
pub const EVENT_UPDATE_STATE: &str = "update://state";
pub const EVENT_UPDATE_PROGRESS: &str = "update://download-progress";
pub const EVENT_UPDATE_READY: &str = "update://ready";
pub const EVENT_UPDATE_FAILED: &str = "update://failed";
