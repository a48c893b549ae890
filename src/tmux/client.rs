use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{infer_activity, AgentActivity, TmuxSession};
use crate::session::InputTransport;

/// Client for interacting with tmux via CLI
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
}

impl TmuxClient {
    pub fn new() -> Self {
        Self {
            tmux_path: "tmux".to_string(),
        }
    }

    /// Definitive liveness check for one session. `Ok(false)` means tmux
    /// answered and the session is gone; `Err` means tmux itself could
    /// not be asked.
    pub async fn has_session(&self, session_id: &str) -> Result<bool> {
        let status = Command::new(&self.tmux_path)
            .args(["has-session", "-t", session_id])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("Failed to execute tmux has-session")?;
        Ok(status.success())
    }

    /// List all tmux sessions
    pub async fn list_sessions(&self) -> Result<Vec<TmuxSession>> {
        // Format: session_id|session_name|session_created
        let output = Command::new(&self.tmux_path)
            .args([
                "list-sessions",
                "-F",
                "#{session_id}|#{session_name}|#{session_created}",
            ])
            .output()
            .await
            .context("Failed to execute tmux list-sessions")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            anyhow::bail!("tmux list-sessions failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut sessions = Vec::new();

        for line in stdout.lines() {
            if let Some(session) = self.parse_session_line(line).await {
                sessions.push(session);
            }
        }

        Ok(sessions)
    }

    async fn parse_session_line(&self, line: &str) -> Option<TmuxSession> {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 3 {
            return None;
        }

        let id = parts[0].to_string();
        let name = parts[1].to_string();
        let created_at = parts[2].parse().unwrap_or(0);

        let activity = match self.capture_pane(&id).await {
            Ok(pane) => infer_activity(&pane),
            Err(_) => AgentActivity::Unknown,
        };

        Some(TmuxSession {
            id,
            name,
            created_at,
            activity,
        })
    }

    /// Capture the visible pane content of a session
    pub async fn capture_pane(&self, session_id: &str) -> Result<String> {
        let output = Command::new(&self.tmux_path)
            .args(["capture-pane", "-p", "-t", session_id])
            .output()
            .await
            .context("Failed to capture pane")?;

        if !output.status.success() {
            anyhow::bail!(
                "tmux capture-pane failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Create a new detached session whose shell starts in `cwd`
    pub async fn create_session(&self, name: &str, cwd: &Path) -> Result<TmuxSession> {
        let output = Command::new(&self.tmux_path)
            .args(["new-session", "-d", "-s", name, "-c"])
            .arg(cwd)
            .output()
            .await
            .context("Failed to create tmux session")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to create session: {}", stderr);
        }

        // Get the session info
        let sessions = self.list_sessions().await?;
        sessions
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| anyhow::anyhow!("Session created but not found"))
    }

    /// Kill a session
    pub async fn kill_session(&self, session_id: &str) -> Result<()> {
        let output = Command::new(&self.tmux_path)
            .args(["kill-session", "-t", session_id])
            .output()
            .await
            .context("Failed to kill tmux session")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to kill session: {}", stderr);
        }

        Ok(())
    }
}

#[async_trait]
impl InputTransport for TmuxClient {
    /// Send literal text into the session without executing it.
    /// `-l` keeps tmux from interpreting the text as key names; `--`
    /// keeps leading dashes from being read as flags.
    async fn send_text(&self, session_id: &str, text: &str) -> Result<()> {
        let output = Command::new(&self.tmux_path)
            .args(["send-keys", "-t", session_id, "-l", "--", text])
            .output()
            .await
            .context("Failed to execute tmux send-keys")?;

        if !output.status.success() {
            anyhow::bail!(
                "tmux send-keys failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }

    async fn send_enter(&self, session_id: &str) -> Result<()> {
        let output = Command::new(&self.tmux_path)
            .args(["send-keys", "-t", session_id, "Enter"])
            .output()
            .await
            .context("Failed to execute tmux send-keys")?;

        if !output.status.success() {
            anyhow::bail!(
                "tmux send-keys failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}
