use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::session::{branch_name, SessionRecordUpdate, SessionRegistry, SessionStatus};

/// One session's entry in `.loom/sessions.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub missing_session: bool,
}

/// Session registry persisted as JSON under the workspace. The registry
/// owns worktree cleanup when sessions are destroyed; this process only
/// reports creations and status changes into it.
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(workspace: &Path) -> Self {
        Self {
            path: workspace.join(".loom").join("sessions.json"),
        }
    }

    pub async fn records(&self) -> Result<BTreeMap<String, SessionRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Malformed registry file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).context("Failed to read session registry"),
        }
    }

    async fn store(&self, records: &BTreeMap<String, SessionRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create registry directory")?;
        }
        let contents = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, contents)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    async fn update<F>(&self, session_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut records = self.records().await?;
        apply(records.entry(session_id.to_string()).or_default());
        self.store(&records).await
    }
}

#[async_trait]
impl SessionRegistry for FileRegistry {
    async fn register_worktree_path(&self, session_id: &str, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        let branch = branch_name(session_id);
        self.update(session_id, |record| {
            record.worktree_path = Some(path);
            record.branch = Some(branch);
        })
        .await
    }

    async fn update_session_record(
        &self,
        session_id: &str,
        update: SessionRecordUpdate,
    ) -> Result<()> {
        self.update(session_id, |record| {
            if let Some(status) = update.status {
                record.status = Some(status);
            }
            if let Some(missing) = update.missing_session {
                record.missing_session = missing;
            }
        })
        .await
    }
}
