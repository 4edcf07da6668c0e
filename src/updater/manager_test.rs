//! End-to-end tests for the update manager with in-process fakes

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use std::sync::Arc;

    use crate::constants::{EVENT_UPDATE_PROGRESS, EVENT_UPDATE_READY};
    use crate::test::{enforcement_error, FakePlatform, FakeSource};
    use crate::updater::{
        UpdateAction, UpdateError, UpdateManager, UpdateOrchestrator, UpdatePhase, UpdateSnapshot,
    };

    type Recorded = Arc<Mutex<Vec<(String, UpdateSnapshot)>>>;

    struct Harness {
        manager: UpdateManager,
        source: Arc<FakeSource>,
        platform: Arc<FakePlatform>,
        events: Recorded,
        _dir: tempfile::TempDir,
    }

    fn harness(
        installer_url: Option<&str>,
        source: FakeSource,
        platform: FakePlatform,
        silent_enabled: bool,
    ) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = Arc::new(source);
        let platform = Arc::new(platform);
        let orchestrator = Arc::new(UpdateOrchestrator::new(
            source.clone(),
            platform.clone(),
            dir.path(),
            silent_enabled,
        )
        .with_trusted_hosts(["example"]));

        let events: Recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let manager = UpdateManager::new(enforcement_error(installer_url), orchestrator)
            .with_listener(move |name, snapshot| {
                sink.lock().push((name.to_string(), snapshot.clone()));
            });

        Harness {
            manager,
            source,
            platform,
            events,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_auto_upgrade_runs_to_completion() {
        let mut h = harness(
            Some("https://example/installer.exe"),
            FakeSource::ok(),
            FakePlatform::supported(),
            true,
        );

        assert_eq!(h.manager.mount().await, UpdatePhase::Done);

        let events = h.events.lock().clone();
        let mut phases: Vec<UpdatePhase> = events.iter().map(|(_, s)| s.phase).collect();
        phases.dedup();
        assert_eq!(
            phases,
            vec![
                UpdatePhase::AutoAttempting,
                UpdatePhase::Downloading,
                UpdatePhase::Installing,
                UpdatePhase::Done
            ]
        );

        let progress: Vec<u8> = events
            .iter()
            .filter(|(name, _)| name == EVENT_UPDATE_PROGRESS)
            .map(|(_, s)| s.state.download_progress)
            .collect();
        assert_eq!(progress.first(), Some(&0));
        assert_eq!(progress.last(), Some(&100));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));

        let (last_name, last) = events.last().expect("events");
        assert_eq!(last_name, EVENT_UPDATE_READY);
        assert!(last.state.error.is_none());
        assert!(events.iter().all(|(_, s)| s.state.error.is_none()));
        assert!(!h.manager.state().is_update_required);
        assert_eq!(h.platform.installs().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_installer_url_offers_manual_download_only() {
        let mut h = harness(None, FakeSource::ok(), FakePlatform::supported(), true);
        h.manager = h
            .manager
            .with_fallback_download_url(Some("https://example/downloads".to_string()));

        assert_eq!(h.manager.mount().await, UpdatePhase::Idle);
        assert_eq!(h.source.fetch_count(), 0);
        assert!(h.platform.installs().is_empty());

        let actions = h.manager.available_actions();
        assert!(actions.contains(&UpdateAction::ManualDownload));
        assert!(!actions.contains(&UpdateAction::Retry));
        assert!(matches!(
            h.manager.retry().await,
            Err(UpdateError::InvalidTransition { .. })
        ));

        assert_eq!(
            h.manager.manual_download().await.expect("manual"),
            UpdatePhase::ManualDownload
        );
        assert_eq!(h.platform.opened(), vec!["https://example/downloads".to_string()]);
    }

    #[tokio::test]
    async fn test_automatic_attempt_happens_once() {
        let mut h = harness(
            Some("https://example/installer.exe"),
            FakeSource::failing(),
            FakePlatform::supported(),
            true,
        );

        assert_eq!(h.manager.mount().await, UpdatePhase::Error);
        assert_eq!(h.source.fetch_count(), 1);
        assert!(h.manager.state().error.is_some());

        // Mounting again must not trigger a second unsolicited attempt
        assert_eq!(h.manager.mount().await, UpdatePhase::Error);
        assert_eq!(h.source.fetch_count(), 1);

        // The second failure only happens through an explicit retry
        assert_eq!(h.manager.retry().await.expect("retry"), UpdatePhase::Error);
        assert_eq!(h.source.fetch_count(), 2);
        assert!(h.manager.available_actions().contains(&UpdateAction::Retry));
    }

    #[tokio::test]
    async fn test_disabled_flag_skips_silent_upgrade() {
        let mut h = harness(
            Some("https://example/installer.exe"),
            FakeSource::ok(),
            FakePlatform::supported(),
            false,
        );

        assert_eq!(h.manager.mount().await, UpdatePhase::Idle);
        assert_eq!(h.source.fetch_count(), 0);

        h.manager.manual_download().await.expect("manual");
        assert_eq!(
            h.platform.opened(),
            vec!["https://example/installer.exe".to_string()]
        );
    }

    #[tokio::test]
    async fn test_install_failure_then_manual_download() {
        let mut h = harness(
            Some("https://example/installer.msi"),
            FakeSource::ok(),
            FakePlatform::failing_install(),
            true,
        );

        assert_eq!(h.manager.mount().await, UpdatePhase::Error);
        let error = h.manager.state().error.clone().expect("error message");
        assert!(error.contains("1603"));

        assert_eq!(
            h.manager.manual_download().await.expect("manual"),
            UpdatePhase::ManualDownload
        );
        assert!(h.manager.state().error.is_none());
    }

    #[tokio::test]
    async fn test_open_failure_is_recorded_not_raised() {
        let mut h = harness(
            Some("https://example/installer.exe"),
            FakeSource::ok(),
            FakePlatform::failing_open(),
            true,
        );

        assert_eq!(h.manager.mount().await, UpdatePhase::Idle);
        assert_eq!(
            h.manager.manual_download().await.expect("handled"),
            UpdatePhase::Idle
        );
        assert!(h.manager.state().error.is_some());
    }

    #[tokio::test]
    async fn test_back_to_login_discards_enforcement() {
        let mut h = harness(None, FakeSource::ok(), FakePlatform::unsupported(), true);

        h.manager.mount().await;
        h.manager.back_to_login().expect("abandon");

        assert_eq!(h.manager.phase(), UpdatePhase::Abandoned);
        assert!(h.manager.state().enforcement_data.is_none());
        assert!(h.manager.back_to_login().is_err());
    }

    #[tokio::test]
    async fn test_manual_download_without_any_url_reports_error() {
        let mut h = harness(None, FakeSource::ok(), FakePlatform::unsupported(), true);

        h.manager.mount().await;
        assert_eq!(
            h.manager.manual_download().await.expect("handled"),
            UpdatePhase::Idle
        );
        assert_eq!(
            h.manager.state().error.as_deref(),
            Some(UpdateError::InstallerUrlMissing.to_string().as_str())
        );
        assert!(h.platform.opened().is_empty());
    }

    #[tokio::test]
    async fn test_untrusted_installer_host_falls_back_to_manual_download() {
        let mut h = harness(
            Some("https://downloads.attacker.test/installer.exe"),
            FakeSource::ok(),
            FakePlatform::supported(),
            true,
        );

        assert_eq!(h.manager.mount().await, UpdatePhase::Idle);
        assert_eq!(h.source.fetch_count(), 0);
        assert!(h.platform.installs().is_empty());
        assert!(!h.manager.available_actions().contains(&UpdateAction::Retry));
    }
}
