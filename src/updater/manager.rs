//! Update manager implementation
//!
//! Drives the update screen for one rejected login: makes the single
//! automatic silent-upgrade attempt on mount, then reacts to the user's
//! retry, manual download and back-to-login choices. State changes are
//! published to an optional listener as they happen.

use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;

use super::error::{Result, UpdateError};
use super::orchestrator::UpdateOrchestrator;
use super::state_machine::{UpdateAction, UpdateEvent, UpdateGate, UpdatePhase};
use super::types::{UpdateState, UpgradeProgress, VersionEnforcementError};
use crate::constants::{
    EVENT_UPDATE_FAILED, EVENT_UPDATE_PROGRESS, EVENT_UPDATE_READY, EVENT_UPDATE_STATE,
};

/// What a listener receives on every change
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSnapshot {
    pub phase: UpdatePhase,
    pub state: UpdateState,
    pub actions: Vec<UpdateAction>,
}

impl UpdateSnapshot {
    fn of(gate: &UpdateGate) -> Self {
        Self {
            phase: gate.phase(),
            state: gate.state().clone(),
            actions: gate.available_actions(),
        }
    }
}

/// Receives `(event name, snapshot)` pairs
pub type UpdateListener = Arc<dyn Fn(&str, &UpdateSnapshot) + Send + Sync>;

fn publish(listener: &Option<UpdateListener>, event: &str, gate: &UpdateGate) {
    if let Some(listener) = listener {
        listener(event, &UpdateSnapshot::of(gate));
    }
}

fn event_name(phase: UpdatePhase) -> &'static str {
    match phase {
        UpdatePhase::Done => EVENT_UPDATE_READY,
        UpdatePhase::Error => EVENT_UPDATE_FAILED,
        _ => EVENT_UPDATE_STATE,
    }
}

/// Manages the update process for one rejected login
pub struct UpdateManager {
    gate: UpdateGate,
    orchestrator: Arc<UpdateOrchestrator>,
    fallback_download_url: Option<String>,
    listener: Option<UpdateListener>,
}

impl UpdateManager {
    /// Creates a manager for `error`, asking the orchestrator up front
    /// whether the silent path exists.
    pub fn new(error: VersionEnforcementError, orchestrator: Arc<UpdateOrchestrator>) -> Self {
        let silent = orchestrator.can_perform_silent_upgrade(&error);
        Self {
            gate: UpdateGate::new(error, silent),
            orchestrator,
            fallback_download_url: None,
            listener: None,
        }
    }

    /// Page opened by manual download when the rejection has no installer URL
    pub fn with_fallback_download_url(mut self, url: Option<String>) -> Self {
        self.fallback_download_url = url;
        self
    }

    pub fn with_listener(
        mut self,
        listener: impl Fn(&str, &UpdateSnapshot) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn phase(&self) -> UpdatePhase {
        self.gate.phase()
    }

    pub fn state(&self) -> &UpdateState {
        self.gate.state()
    }

    pub fn snapshot(&self) -> UpdateSnapshot {
        UpdateSnapshot::of(&self.gate)
    }

    pub fn available_actions(&self) -> Vec<UpdateAction> {
        self.gate.available_actions()
    }

    /// Called when the update screen appears. Makes the automatic attempt
    /// if the silent path exists and nothing has been tried yet; otherwise
    /// leaves the screen showing the manual options.
    pub async fn mount(&mut self) -> UpdatePhase {
        if self.gate.phase() != UpdatePhase::Idle {
            return self.gate.phase();
        }

        if !self.gate.silent_upgrade_possible() {
            info!("Silent upgrade unavailable, offering manual download");
            publish(&self.listener, EVENT_UPDATE_STATE, &self.gate);
            return self.gate.phase();
        }

        if self.apply(UpdateEvent::AutoStart).is_ok() {
            self.run_upgrade().await;
        }
        self.gate.phase()
    }

    /// User-initiated retry after a failure. Starts a fresh attempt.
    pub async fn retry(&mut self) -> Result<UpdatePhase> {
        self.apply(UpdateEvent::Retry)?;
        self.run_upgrade().await;
        Ok(self.gate.phase())
    }

    /// Opens the installer (or fallback page) with the OS handler.
    ///
    /// Failing to open is not an error for the caller: it is logged and shown
    /// on the screen, which stays where it was.
    pub async fn manual_download(&mut self) -> Result<UpdatePhase> {
        if self.gate.next_phase(&UpdateEvent::ManualDownload).is_none() {
            return Err(UpdateError::InvalidTransition {
                phase: self.gate.phase().to_string(),
                event: UpdateEvent::ManualDownload.to_string(),
            });
        }

        let url = self
            .gate
            .state()
            .enforcement_data
            .as_ref()
            .and_then(|e| e.installer_url().map(str::to_string))
            .or_else(|| self.fallback_download_url.clone());

        let Some(url) = url else {
            warn!("No installer URL or fallback download page configured");
            self.gate
                .record_error(UpdateError::InstallerUrlMissing.to_string());
            publish(&self.listener, EVENT_UPDATE_STATE, &self.gate);
            return Ok(self.gate.phase());
        };

        match self.orchestrator.open_installer_download(&url).await {
            Ok(()) => {
                self.apply(UpdateEvent::ManualDownload)?;
            }
            Err(e) => {
                self.gate.record_error(e.to_string());
                publish(&self.listener, EVENT_UPDATE_STATE, &self.gate);
            }
        }
        Ok(self.gate.phase())
    }

    /// Leaves the update screen; the enforcement data is discarded.
    pub fn back_to_login(&mut self) -> Result<()> {
        self.apply(UpdateEvent::Abandon).map(|_| ())
    }

    fn apply(&mut self, event: UpdateEvent) -> Result<UpdatePhase> {
        let phase = self.gate.transition(event)?;
        publish(&self.listener, event_name(phase), &self.gate);
        Ok(phase)
    }

    async fn run_upgrade(&mut self) {
        let Some(error) = self.gate.state().enforcement_data.clone() else {
            return;
        };

        let orchestrator = self.orchestrator.clone();
        let result = {
            let gate = &mut self.gate;
            let listener = &self.listener;
            let mut on_progress = |progress: UpgradeProgress| {
                let event = UpdateEvent::from(progress);
                match gate.transition(event) {
                    Ok(phase) => {
                        let name = match progress {
                            UpgradeProgress::Downloading(_) => EVENT_UPDATE_PROGRESS,
                            UpgradeProgress::Installing => event_name(phase),
                        };
                        publish(listener, name, gate);
                    }
                    Err(e) => warn!("Ignoring upgrade progress: {}", e),
                }
            };
            orchestrator
                .perform_silent_upgrade(&error, &mut on_progress)
                .await
        };

        let outcome = match result {
            Ok(()) => UpdateEvent::Completed,
            Err(e) => {
                error!("Silent upgrade to {} failed: {}", error.target_version, e);
                UpdateEvent::Failed(e.to_string())
            }
        };
        if let Err(e) = self.apply(outcome) {
            error!("Update state machine rejected the upgrade outcome: {}", e);
        }
    }
}
