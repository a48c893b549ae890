mod channel;
mod coordinator;
mod liveness;
mod worktree;

pub use channel::{CommandChannel, InputTransport, COMMAND_SETTLE};
pub use coordinator::AttachmentCoordinator;
pub use liveness::LivenessTracker;
pub use worktree::{
    branch_name, worktree_path, ProvisionError, ProvisionStep, WorktreeProvisioner,
};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Git identity applied to a freshly provisioned worktree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Status recorded against a session in the external registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Error,
}

/// Partial update applied to a session's registry record
#[derive(Debug, Clone, Default)]
pub struct SessionRecordUpdate {
    pub status: Option<SessionStatus>,
    pub missing_session: Option<bool>,
}

impl SessionRecordUpdate {
    /// Update marking a session whose backing terminal no longer exists
    pub fn missing() -> Self {
        Self {
            status: Some(SessionStatus::Error),
            missing_session: Some(true),
        }
    }
}

/// Backend owning the authoritative terminal-session table, the preview
/// views, and the output-polling flags.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Ask the backend whether the session's process is still alive.
    /// `Ok(false)` is a definitive negative; `Err` means the probe itself
    /// could not be carried out.
    async fn probe_session_live(&self, session_id: &str) -> Result<bool>;

    async fn has_view(&self, session_id: &str) -> bool;
    async fn create_view(&self, session_id: &str) -> Result<()>;
    async fn show_view(&self, session_id: &str) -> Result<()>;
    async fn hide_view(&self, session_id: &str) -> Result<()>;

    async fn start_polling(&self, session_id: &str) -> Result<()>;
    async fn pause_polling(&self, session_id: &str) -> Result<()>;
    async fn resume_polling(&self, session_id: &str) -> Result<()>;
}

/// External registry that reference-counts worktrees and owns their
/// eventual cleanup. This component only reports creations and status
/// changes to it.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn register_worktree_path(&self, session_id: &str, path: &Path) -> Result<()>;
    async fn update_session_record(
        &self,
        session_id: &str,
        update: SessionRecordUpdate,
    ) -> Result<()>;
}
