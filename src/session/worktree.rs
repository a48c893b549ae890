use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::{CommandChannel, Identity, SessionRegistry};

/// Container directory for per-agent worktrees, relative to the repo root.
/// External cleanup locates worktrees by this exact convention.
const WORKTREES_DIR: &str = ".loom/worktrees";

/// Worktree path for a session: `<repoRoot>/.loom/worktrees/<sessionId>`
pub fn worktree_path(repo_root: &Path, session_id: &str) -> PathBuf {
    repo_root.join(WORKTREES_DIR).join(session_id)
}

/// Branch checked out in a session's worktree: `worktree/<sessionId>`.
/// Git refuses to check the same branch out in two worktrees, so unique
/// branch names are what isolates concurrent agents from each other.
pub fn branch_name(session_id: &str) -> String {
    format!("worktree/{}", session_id)
}

/// The provisioning step that was being executed when a command failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    EnsureContainer,
    AddWorktree,
    EnterWorktree,
    SetIdentityName,
    SetIdentityEmail,
}

#[derive(Debug, Error)]
#[error("worktree provisioning failed at step {step:?}")]
pub struct ProvisionError {
    pub step: ProvisionStep,
    #[source]
    pub source: anyhow::Error,
}

/// Drives the Command Channel through the fixed sequence that creates an
/// isolated worktree for one agent session. The channel has no response
/// signal, so each step is awaited (settle delay included) before the
/// next is issued.
pub struct WorktreeProvisioner {
    channel: Arc<CommandChannel>,
    registry: Arc<dyn SessionRegistry>,
}

impl WorktreeProvisioner {
    pub fn new(channel: Arc<CommandChannel>, registry: Arc<dyn SessionRegistry>) -> Self {
        Self { channel, registry }
    }

    /// Create the worktree for `session_id` rooted at the repository's
    /// HEAD and leave the session's shell inside it. Must not be called
    /// twice concurrently for the same session.
    ///
    /// Registration with the session registry is best-effort: the
    /// worktree already exists on disk by then and cleanup can still
    /// find it by path convention, so a registry failure is logged and
    /// the path is returned anyway.
    pub async fn provision(
        &self,
        session_id: &str,
        repo_root: &Path,
        identity: Option<&Identity>,
    ) -> Result<PathBuf, ProvisionError> {
        let container = repo_root.join(WORKTREES_DIR);
        let path = worktree_path(repo_root, session_id);
        let branch = branch_name(session_id);

        let mut steps: Vec<(ProvisionStep, String)> = vec![
            (
                ProvisionStep::EnsureContainer,
                format!("mkdir -p \"{}\"", container.display()),
            ),
            (
                ProvisionStep::AddWorktree,
                format!(
                    "git worktree add -b \"{}\" \"{}\"",
                    branch,
                    path.display()
                ),
            ),
            (
                ProvisionStep::EnterWorktree,
                format!("cd \"{}\"", path.display()),
            ),
        ];

        if let Some(identity) = identity {
            steps.push((
                ProvisionStep::SetIdentityName,
                format!("git config user.name \"{}\"", identity.name),
            ));
            steps.push((
                ProvisionStep::SetIdentityEmail,
                format!("git config user.email \"{}\"", identity.email),
            ));
        }

        for (step, line) in steps {
            self.channel
                .run_command(session_id, &line)
                .await
                .map_err(|source| ProvisionError { step, source })?;
        }

        if let Err(e) = self.registry.register_worktree_path(session_id, &path).await {
            tracing::warn!(
                session = session_id,
                error = %e,
                "worktree created but registration failed"
            );
        }

        Ok(path)
    }
}
