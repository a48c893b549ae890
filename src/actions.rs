use crossterm::event::KeyEvent;
use std::collections::BTreeMap;

use crate::registry::SessionRecord;
use crate::tmux::TmuxSession;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// Sessions were updated from tmux
    SessionsUpdated(Vec<TmuxSession>),
    /// Registry records were reloaded
    RecordsUpdated(BTreeMap<String, SessionRecord>),
    /// Fresh pane content for the polled session
    PreviewUpdated { session_id: String, content: String },
    /// An error occurred
    Error(String),
    /// Request to quit the application
    Quit,
    /// Attach to a session (make it visible and polled)
    AttachSession(String),
    /// Launch a new agent: session + isolated worktree
    LaunchAgent(String),
    /// Kill a session
    DeleteSession(String),
    /// Forward interactive input to a session
    SendInput { session_id: String, text: String },
}
