use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use super::{InputLogEntry, LogSink};

/// Appends entries as JSON lines to
/// `<workspace>/.loom/logs/input-<YYYY-MM-DD>.jsonl`
pub struct JsonlSink;

#[async_trait]
impl LogSink for JsonlSink {
    async fn persist(&self, workspace: &Path, log_id: &str, entry: &InputLogEntry) -> Result<()> {
        let dir = workspace.join(".loom").join("logs");
        tokio::fs::create_dir_all(&dir)
            .await
            .context("Failed to create log directory")?;

        let path = dir.join(format!("input-{}.jsonl", log_id));
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}
