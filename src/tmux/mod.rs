mod backend;
mod client;
mod status;

pub use backend::TmuxBackend;
pub use client::TmuxClient;
pub use status::{infer_activity, AgentActivity};

use serde::{Deserialize, Serialize};

/// One tmux session as seen by the refresh loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxSession {
    /// tmux session id (e.g. "$0")
    pub id: String,
    /// Session name (e.g. "loom-fix-parser")
    pub name: String,
    /// Unix timestamp when the session was created
    pub created_at: u64,
    /// Activity inferred from recent pane content
    pub activity: AgentActivity,
}
