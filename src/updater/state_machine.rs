//! Update screen state machine
//!
//! Phases of the blocking update screen and the only code allowed to change
//! its [`UpdateState`]. The machine starts in `Idle` and no transition ever
//! leads back there, so the unsolicited `AutoStart` can fire at most once
//! per machine. Every later attempt is an explicit `Retry`.

use log::{debug, warn};
use serde::Serialize;
use strum::Display;

use super::error::{Result, UpdateError};
use super::types::{UpdateState, UpgradeProgress, VersionEnforcementError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "snake_case")]
pub enum UpdatePhase {
    /// Screen mounted, nothing attempted yet
    Idle,
    /// Unsolicited silent upgrade accepted, download about to start
    AutoAttempting,
    Downloading,
    Installing,
    /// Upgrade installed
    Done,
    /// Last attempt failed, waiting for the user
    Error,
    /// Control handed to the OS download handler
    ManualDownload,
    /// User went back to the login screen
    Abandoned,
}

impl UpdatePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdatePhase::Done | UpdatePhase::ManualDownload | UpdatePhase::Abandoned
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UpdatePhase::AutoAttempting | UpdatePhase::Downloading | UpdatePhase::Installing
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum UpdateEvent {
    /// The one unsolicited attempt made on mount
    AutoStart,
    /// User asked to try the silent upgrade again
    Retry,
    DownloadProgress(u8),
    InstallStarted,
    Completed,
    Failed(String),
    ManualDownload,
    Abandon,
}

impl From<UpgradeProgress> for UpdateEvent {
    fn from(progress: UpgradeProgress) -> Self {
        match progress {
            UpgradeProgress::Downloading(percent) => UpdateEvent::DownloadProgress(percent),
            UpgradeProgress::Installing => UpdateEvent::InstallStarted,
        }
    }
}

/// Controls the update screen may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateAction {
    Retry,
    ManualDownload,
    BackToLogin,
}

/// The update screen state machine
#[derive(Debug, Clone)]
pub struct UpdateGate {
    phase: UpdatePhase,
    state: UpdateState,
    silent_upgrade_possible: bool,
}

impl UpdateGate {
    /// A machine for one rejected login. `silent_upgrade_possible` is the
    /// orchestrator's capability answer for `error`.
    pub fn new(error: VersionEnforcementError, silent_upgrade_possible: bool) -> Self {
        Self {
            phase: UpdatePhase::Idle,
            state: UpdateState {
                is_update_required: true,
                enforcement_data: Some(error),
                ..UpdateState::default()
            },
            silent_upgrade_possible,
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn silent_upgrade_possible(&self) -> bool {
        self.silent_upgrade_possible
    }

    /// Phase `event` would lead to, `None` if the event is not allowed now
    pub fn next_phase(&self, event: &UpdateEvent) -> Option<UpdatePhase> {
        use UpdateEvent as E;
        use UpdatePhase as P;

        match (self.phase, event) {
            (P::Idle, E::AutoStart) if self.silent_upgrade_possible => Some(P::AutoAttempting),
            (P::Error, E::Retry) if self.silent_upgrade_possible => Some(P::Downloading),
            (P::AutoAttempting | P::Downloading, E::DownloadProgress(_)) => Some(P::Downloading),
            (P::AutoAttempting | P::Downloading, E::InstallStarted) => Some(P::Installing),
            (P::Installing, E::Completed) => Some(P::Done),
            (P::AutoAttempting | P::Downloading | P::Installing, E::Failed(_)) => Some(P::Error),
            (P::Idle | P::Error, E::ManualDownload) => Some(P::ManualDownload),
            (P::Idle | P::Error, E::Abandon) => Some(P::Abandoned),
            _ => None,
        }
    }

    /// Applies `event`, returning the new phase. A rejected event leaves the
    /// machine untouched.
    pub fn transition(&mut self, event: UpdateEvent) -> Result<UpdatePhase> {
        let next = self.next_phase(&event).ok_or_else(|| {
            warn!("Rejected update event {} in phase {}", event, self.phase);
            UpdateError::InvalidTransition {
                phase: self.phase.to_string(),
                event: event.to_string(),
            }
        })?;

        let state = &mut self.state;
        match event {
            UpdateEvent::AutoStart => {
                state.error = None;
            }
            UpdateEvent::Retry => {
                state.error = None;
                state.is_downloading = true;
                state.download_progress = 0;
            }
            UpdateEvent::DownloadProgress(percent) => {
                state.is_downloading = true;
                state.download_progress = percent.min(100);
            }
            UpdateEvent::InstallStarted => {
                state.is_downloading = false;
                state.is_installing = true;
                state.download_progress = 100;
            }
            UpdateEvent::Completed => {
                state.is_installing = false;
                state.is_update_required = false;
                state.enforcement_data = None;
            }
            UpdateEvent::Failed(message) => {
                state.is_downloading = false;
                state.is_installing = false;
                state.error = Some(message);
            }
            UpdateEvent::ManualDownload => {
                state.error = None;
            }
            UpdateEvent::Abandon => {
                state.is_update_required = false;
                state.error = None;
                state.enforcement_data = None;
            }
        }

        if next != self.phase {
            debug!("Update phase {} -> {}", self.phase, next);
        }
        self.phase = next;
        Ok(next)
    }

    /// Attaches an error to the screen without changing phase, for failures
    /// that leave the user where they were (a URL that would not open).
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.state.error = Some(message.into());
    }

    /// Controls to show for the current phase
    pub fn available_actions(&self) -> Vec<UpdateAction> {
        match self.phase {
            UpdatePhase::Idle => vec![UpdateAction::ManualDownload, UpdateAction::BackToLogin],
            UpdatePhase::Error if self.silent_upgrade_possible => vec![
                UpdateAction::Retry,
                UpdateAction::ManualDownload,
                UpdateAction::BackToLogin,
            ],
            UpdatePhase::Error => vec![UpdateAction::ManualDownload, UpdateAction::BackToLogin],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::enforcement_error;

    fn gate(silent: bool) -> UpdateGate {
        UpdateGate::new(enforcement_error(Some("https://example/installer.exe")), silent)
    }

    #[test]
    fn test_happy_path() {
        let mut gate = gate(true);
        assert_eq!(gate.phase(), UpdatePhase::Idle);
        assert!(gate.state().is_update_required);

        assert_eq!(
            gate.transition(UpdateEvent::AutoStart).expect("auto"),
            UpdatePhase::AutoAttempting
        );
        for percent in [0, 40, 100] {
            gate.transition(UpdateEvent::DownloadProgress(percent))
                .expect("progress");
            assert_eq!(gate.state().download_progress, percent);
            assert!(gate.state().is_downloading);
        }
        gate.transition(UpdateEvent::InstallStarted).expect("install");
        assert!(gate.state().is_installing);
        assert!(!gate.state().is_downloading);

        assert_eq!(
            gate.transition(UpdateEvent::Completed).expect("done"),
            UpdatePhase::Done
        );
        assert!(gate.phase().is_terminal());
        assert!(!gate.state().is_update_required);
        assert!(gate.state().enforcement_data.is_none());
        assert!(gate.state().error.is_none());
    }

    #[test]
    fn test_auto_start_cannot_repeat_after_failure() {
        let mut gate = gate(true);
        gate.transition(UpdateEvent::AutoStart).expect("auto");
        gate.transition(UpdateEvent::Failed("network down".into()))
            .expect("fail");

        assert_eq!(gate.phase(), UpdatePhase::Error);
        assert_eq!(gate.state().error.as_deref(), Some("network down"));
        assert!(matches!(
            gate.transition(UpdateEvent::AutoStart),
            Err(UpdateError::InvalidTransition { .. })
        ));
        assert_eq!(gate.phase(), UpdatePhase::Error);

        assert_eq!(
            gate.transition(UpdateEvent::Retry).expect("retry"),
            UpdatePhase::Downloading
        );
        assert!(gate.state().error.is_none());
        assert_eq!(gate.state().download_progress, 0);
    }

    #[test]
    fn test_no_silent_path_without_capability() {
        let mut gate = gate(false);
        assert!(gate.transition(UpdateEvent::AutoStart).is_err());
        assert_eq!(
            gate.available_actions(),
            vec![UpdateAction::ManualDownload, UpdateAction::BackToLogin]
        );
        assert_eq!(
            gate.transition(UpdateEvent::ManualDownload).expect("manual"),
            UpdatePhase::ManualDownload
        );
        assert!(gate.available_actions().is_empty());
    }

    #[test]
    fn test_error_offers_retry_only_when_silent_possible() {
        let mut gate = gate(true);
        gate.transition(UpdateEvent::AutoStart).expect("auto");
        gate.transition(UpdateEvent::Failed("boom".into())).expect("fail");
        assert_eq!(
            gate.available_actions(),
            vec![
                UpdateAction::Retry,
                UpdateAction::ManualDownload,
                UpdateAction::BackToLogin
            ]
        );
    }

    #[test]
    fn test_abandon_discards_enforcement_data() {
        let mut gate = gate(false);
        gate.record_error("could not open browser");
        gate.transition(UpdateEvent::Abandon).expect("abandon");

        assert_eq!(gate.phase(), UpdatePhase::Abandoned);
        assert!(gate.state().enforcement_data.is_none());
        assert!(gate.state().error.is_none());
        assert!(gate.transition(UpdateEvent::ManualDownload).is_err());
    }

    #[test]
    fn test_progress_outside_download_is_rejected() {
        let mut gate = gate(true);
        let before = gate.state().clone();
        assert!(gate.transition(UpdateEvent::DownloadProgress(50)).is_err());
        assert!(gate.transition(UpdateEvent::Completed).is_err());
        assert_eq!(gate.state(), &before);
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut gate = gate(true);
        gate.transition(UpdateEvent::AutoStart).expect("auto");
        gate.transition(UpdateEvent::DownloadProgress(250))
            .expect("progress");
        assert_eq!(gate.state().download_progress, 100);
    }
}
