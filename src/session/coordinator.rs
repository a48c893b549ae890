use anyhow::Result;
use std::sync::Arc;

use super::{LivenessTracker, SessionRecordUpdate, SessionRegistry, TerminalBackend};

/// Serializes attach transitions so that exactly one session is shown
/// and polled for output at a time. Owns the liveness probe gate and the
/// global "currently attached" pointer.
pub struct AttachmentCoordinator {
    backend: Arc<dyn TerminalBackend>,
    registry: Arc<dyn SessionRegistry>,
    liveness: LivenessTracker,
    attached: Option<String>,
}

impl AttachmentCoordinator {
    pub fn new(backend: Arc<dyn TerminalBackend>, registry: Arc<dyn SessionRegistry>) -> Self {
        Self {
            backend,
            registry,
            liveness: LivenessTracker::new(),
            attached: None,
        }
    }

    pub fn attached(&self) -> Option<&str> {
        self.attached.as_deref()
    }

    /// Make `session_id` the single attached session.
    ///
    /// The liveness probe runs at most once per session per process run.
    /// A probe transport error is inconclusive and the attach proceeds
    /// optimistically; a definitive `false` marks the session's record
    /// as missing and stops the transition before any view exists.
    pub async fn attach(&mut self, session_id: &str) -> Result<()> {
        if session_id.is_empty() {
            // An unassigned slot upstream; nothing to attach to.
            tracing::debug!("ignoring attach request for unassigned slot");
            return Ok(());
        }

        if self.liveness.should_probe(session_id) {
            let probe = self.backend.probe_session_live(session_id).await;
            self.liveness.mark_checked(session_id);
            match probe {
                Err(e) => {
                    tracing::warn!(
                        session = session_id,
                        error = %e,
                        "liveness probe failed, proceeding anyway"
                    );
                }
                Ok(false) => {
                    if let Err(e) = self
                        .registry
                        .update_session_record(session_id, SessionRecordUpdate::missing())
                        .await
                    {
                        tracing::warn!(
                            session = session_id,
                            error = %e,
                            "failed to record missing session"
                        );
                    }
                    return Ok(());
                }
                Ok(true) => {}
            }
        }

        let previous = self
            .attached
            .clone()
            .filter(|prev| prev != session_id);

        if self.backend.has_view(session_id).await {
            if let Some(prev) = &previous {
                self.backend.hide_view(prev).await?;
                self.backend.pause_polling(prev).await?;
            }
            self.backend.show_view(session_id).await?;
            self.backend.resume_polling(session_id).await?;
        } else {
            if let Some(prev) = &previous {
                self.backend.hide_view(prev).await?;
                self.backend.pause_polling(prev).await?;
            }
            // Give the render target a turn to land in the display tree
            // before the view binds to it.
            tokio::task::yield_now().await;
            self.backend.create_view(session_id).await?;
            self.backend.start_polling(session_id).await?;
        }

        // Written last: a failure above leaves the previous session
        // attached rather than an inconsistent half-transition.
        self.attached = Some(session_id.to_string());
        Ok(())
    }

    /// Workspace close / engine restart: drop the attached pointer and
    /// the probe history.
    pub fn reset(&mut self) {
        self.liveness.reset();
        self.attached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum ProbeOutcome {
        Live,
        Dead,
        Fails,
    }

    #[derive(Default)]
    struct MockBackend {
        probes: HashMap<String, ProbeOutcome>,
        events: Mutex<Vec<String>>,
        views: Mutex<HashSet<String>>,
    }

    impl MockBackend {
        fn with_probe(mut self, session_id: &str, outcome: ProbeOutcome) -> Self {
            self.probes.insert(session_id.to_string(), outcome);
            self
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl TerminalBackend for MockBackend {
        async fn probe_session_live(&self, session_id: &str) -> Result<bool> {
            self.push(format!("probe {}", session_id));
            match self.probes.get(session_id).copied() {
                Some(ProbeOutcome::Live) | None => Ok(true),
                Some(ProbeOutcome::Dead) => Ok(false),
                Some(ProbeOutcome::Fails) => bail!("backend unreachable"),
            }
        }

        async fn has_view(&self, session_id: &str) -> bool {
            self.views.lock().unwrap().contains(session_id)
        }

        async fn create_view(&self, session_id: &str) -> Result<()> {
            self.views.lock().unwrap().insert(session_id.to_string());
            self.push(format!("create {}", session_id));
            Ok(())
        }

        async fn show_view(&self, session_id: &str) -> Result<()> {
            self.push(format!("show {}", session_id));
            Ok(())
        }

        async fn hide_view(&self, session_id: &str) -> Result<()> {
            self.push(format!("hide {}", session_id));
            Ok(())
        }

        async fn start_polling(&self, session_id: &str) -> Result<()> {
            self.push(format!("start {}", session_id));
            Ok(())
        }

        async fn pause_polling(&self, session_id: &str) -> Result<()> {
            self.push(format!("pause {}", session_id));
            Ok(())
        }

        async fn resume_polling(&self, session_id: &str) -> Result<()> {
            self.push(format!("resume {}", session_id));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingRegistry {
        updates: Mutex<Vec<(String, Option<bool>)>>,
    }

    #[async_trait]
    impl SessionRegistry for RecordingRegistry {
        async fn register_worktree_path(
            &self,
            _session_id: &str,
            _path: &std::path::Path,
        ) -> Result<()> {
            Ok(())
        }

        async fn update_session_record(
            &self,
            session_id: &str,
            update: SessionRecordUpdate,
        ) -> Result<()> {
            self.updates
                .lock()
                .unwrap()
                .push((session_id.to_string(), update.missing_session));
            Ok(())
        }
    }

    fn coordinator(backend: Arc<MockBackend>) -> (AttachmentCoordinator, Arc<RecordingRegistry>) {
        let registry = Arc::new(RecordingRegistry::default());
        (
            AttachmentCoordinator::new(backend, registry.clone()),
            registry,
        )
    }

    #[tokio::test]
    async fn first_attach_creates_view_and_starts_polling() {
        let backend = Arc::new(MockBackend::default());
        let (mut coordinator, _) = coordinator(backend.clone());

        coordinator.attach("t1").await.unwrap();

        assert_eq!(backend.events(), vec!["probe t1", "create t1", "start t1"]);
        assert_eq!(coordinator.attached(), Some("t1"));
    }

    #[tokio::test]
    async fn switching_pauses_previous_before_starting_next() {
        let backend = Arc::new(MockBackend::default());
        let (mut coordinator, _) = coordinator(backend.clone());

        coordinator.attach("t1").await.unwrap();
        coordinator.attach("t2").await.unwrap();

        let events = backend.events();
        let pause_t1 = events.iter().position(|e| e == "pause t1").unwrap();
        let start_t2 = events.iter().position(|e| e == "start t2").unwrap();
        assert!(pause_t1 < start_t2);
        assert_eq!(coordinator.attached(), Some("t2"));
    }

    #[tokio::test]
    async fn switching_back_resumes_existing_view() {
        let backend = Arc::new(MockBackend::default());
        let (mut coordinator, _) = coordinator(backend.clone());

        coordinator.attach("t1").await.unwrap();
        coordinator.attach("t2").await.unwrap();
        coordinator.attach("t1").await.unwrap();

        let events = backend.events();
        assert!(events.contains(&"pause t2".to_string()));
        assert_eq!(events.last().unwrap(), "resume t1");
        // View was created once; coming back reuses it.
        assert_eq!(events.iter().filter(|e| *e == "create t1").count(), 1);
        assert_eq!(coordinator.attached(), Some("t1"));
    }

    #[tokio::test]
    async fn dead_session_gets_error_record_and_no_polling() {
        let backend = Arc::new(MockBackend::default().with_probe("t3", ProbeOutcome::Dead));
        let (mut coordinator, registry) = coordinator(backend.clone());

        coordinator.attach("t3").await.unwrap();

        assert_eq!(backend.events(), vec!["probe t3"]);
        assert_eq!(coordinator.attached(), None);
        let updates = registry.updates.lock().unwrap();
        assert_eq!(*updates, vec![("t3".to_string(), Some(true))]);
    }

    #[tokio::test]
    async fn probe_error_proceeds_optimistically() {
        let backend = Arc::new(MockBackend::default().with_probe("t1", ProbeOutcome::Fails));
        let (mut coordinator, registry) = coordinator(backend.clone());

        coordinator.attach("t1").await.unwrap();

        assert_eq!(backend.events(), vec!["probe t1", "create t1", "start t1"]);
        assert!(registry.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn probe_runs_once_per_session() {
        let backend = Arc::new(MockBackend::default());
        let (mut coordinator, _) = coordinator(backend.clone());

        coordinator.attach("t1").await.unwrap();
        coordinator.attach("t2").await.unwrap();
        coordinator.attach("t1").await.unwrap();

        let events = backend.events();
        assert_eq!(events.iter().filter(|e| *e == "probe t1").count(), 1);
        assert_eq!(events.iter().filter(|e| *e == "probe t2").count(), 1);
    }

    #[tokio::test]
    async fn reset_allows_reprobing() {
        let backend = Arc::new(MockBackend::default());
        let (mut coordinator, _) = coordinator(backend.clone());

        coordinator.attach("t1").await.unwrap();
        coordinator.reset();
        assert_eq!(coordinator.attached(), None);

        coordinator.attach("t1").await.unwrap();
        let events = backend.events();
        assert_eq!(events.iter().filter(|e| *e == "probe t1").count(), 2);
    }

    #[tokio::test]
    async fn unassigned_slot_is_a_no_op() {
        let backend = Arc::new(MockBackend::default());
        let (mut coordinator, _) = coordinator(backend.clone());

        coordinator.attach("").await.unwrap();

        assert!(backend.events().is_empty());
        assert_eq!(coordinator.attached(), None);
    }
}
