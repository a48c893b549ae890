use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::TmuxClient;
use crate::session::TerminalBackend;

#[derive(Debug, Default, Clone, Copy)]
struct ViewSlot {
    visible: bool,
    polling: bool,
}

/// `TerminalBackend` over tmux. Liveness probes go to `has-session`;
/// views are in-process preview slots, one per session, and the polling
/// flag decides which single session the refresh loop captures panes
/// for.
pub struct TmuxBackend {
    client: Arc<TmuxClient>,
    views: Mutex<HashMap<String, ViewSlot>>,
}

impl TmuxBackend {
    pub fn new(client: Arc<TmuxClient>) -> Self {
        Self {
            client,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// The session currently polled for output, if any
    pub async fn polled_session(&self) -> Option<String> {
        self.views
            .lock()
            .await
            .iter()
            .find(|(_, slot)| slot.polling)
            .map(|(id, _)| id.clone())
    }

    async fn set_polling(&self, session_id: &str, polling: bool) {
        if let Some(slot) = self.views.lock().await.get_mut(session_id) {
            slot.polling = polling;
        }
    }
}

#[async_trait]
impl TerminalBackend for TmuxBackend {
    async fn probe_session_live(&self, session_id: &str) -> Result<bool> {
        self.client.has_session(session_id).await
    }

    async fn has_view(&self, session_id: &str) -> bool {
        self.views.lock().await.contains_key(session_id)
    }

    async fn create_view(&self, session_id: &str) -> Result<()> {
        self.views.lock().await.insert(
            session_id.to_string(),
            ViewSlot {
                visible: true,
                polling: false,
            },
        );
        Ok(())
    }

    async fn show_view(&self, session_id: &str) -> Result<()> {
        if let Some(slot) = self.views.lock().await.get_mut(session_id) {
            slot.visible = true;
        }
        Ok(())
    }

    async fn hide_view(&self, session_id: &str) -> Result<()> {
        if let Some(slot) = self.views.lock().await.get_mut(session_id) {
            slot.visible = false;
        }
        Ok(())
    }

    async fn start_polling(&self, session_id: &str) -> Result<()> {
        self.set_polling(session_id, true).await;
        Ok(())
    }

    async fn pause_polling(&self, session_id: &str) -> Result<()> {
        self.set_polling(session_id, false).await;
        Ok(())
    }

    async fn resume_polling(&self, session_id: &str) -> Result<()> {
        self.set_polling(session_id, true).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> TmuxBackend {
        TmuxBackend::new(Arc::new(TmuxClient::new()))
    }

    #[tokio::test]
    async fn polling_flag_tracks_one_session() {
        let backend = backend();
        backend.create_view("t1").await.unwrap();
        backend.start_polling("t1").await.unwrap();
        assert_eq!(backend.polled_session().await.as_deref(), Some("t1"));

        backend.pause_polling("t1").await.unwrap();
        backend.create_view("t2").await.unwrap();
        backend.start_polling("t2").await.unwrap();
        assert_eq!(backend.polled_session().await.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn views_persist_across_hide_and_show() {
        let backend = backend();
        assert!(!backend.has_view("t1").await);

        backend.create_view("t1").await.unwrap();
        backend.hide_view("t1").await.unwrap();
        assert!(backend.has_view("t1").await);

        backend.show_view("t1").await.unwrap();
        assert!(backend.has_view("t1").await);
    }

    #[tokio::test]
    async fn nothing_polled_initially() {
        assert_eq!(backend().polled_session().await, None);
    }
}
