mod sink;

pub use sink::JsonlSink;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Flushing starts this long after the first unflushed entry arrives,
/// batching whatever else comes in before it elapses.
pub const FLUSH_DELAY: Duration = Duration::from_millis(1000);

/// Reaching this many buffered entries flushes immediately instead.
pub const MAX_BUFFERED_ENTRIES: usize = 50;

/// Shape-based classification of one piece of interactive input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Enter,
    Command,
    Paste,
    Keystroke,
}

/// Classify input by shape. Precedence: a bare carriage return or
/// newline is `Enter`; other text that ends in one is a `Command`;
/// anything 10+ characters long is assumed pasted; the rest are
/// individual keystrokes. A heuristic for audit grouping, nothing more.
pub fn classify_input_type(text: &str) -> InputKind {
    if !text.is_empty() && text.chars().all(|c| c == '\r' || c == '\n') {
        return InputKind::Enter;
    }
    if text.ends_with('\r') || text.ends_with('\n') {
        return InputKind::Command;
    }
    if text.chars().count() >= 10 {
        InputKind::Paste
    } else {
        InputKind::Keystroke
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLogEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub text: String,
    pub kind: InputKind,
}

/// Persistence boundary for flushed entries. `log_id` is the UTC
/// calendar date (`YYYY-MM-DD`) at flush time; entries for the same day
/// land in the same log.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn persist(&self, workspace: &Path, log_id: &str, entry: &InputLogEntry) -> Result<()>;
}

struct LoggerState {
    workspace: Option<PathBuf>,
    buffer: Vec<InputLogEntry>,
    pending_flush: Option<JoinHandle<()>>,
}

/// Buffered audit log of everything typed at or sent to agent sessions.
///
/// One instance is built in `main` and cloned to call sites; cloning
/// shares the buffer. `log` never performs I/O itself: entries sit in
/// the buffer until the debounce timer fires, the buffer fills, or
/// `stop` forces a final flush. Logging while no workspace is bound is
/// silently dropped.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn LogSink>,
    state: Arc<Mutex<LoggerState>>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(LoggerState {
                workspace: None,
                buffer: Vec::new(),
                pending_flush: None,
            })),
        }
    }

    /// Bind the logger to a workspace and begin accepting entries
    pub async fn start(&self, workspace: impl Into<PathBuf>) {
        self.state.lock().await.workspace = Some(workspace.into());
    }

    /// Record one input event. Non-blocking on the interactive path:
    /// the entry is buffered and a flush is scheduled if none is
    /// pending, except that a full buffer flushes right away.
    pub async fn log(&self, text: &str, session_id: &str) {
        let flush_now = {
            let mut state = self.state.lock().await;
            if state.workspace.is_none() {
                return;
            }
            state.buffer.push(InputLogEntry {
                timestamp: Utc::now(),
                session_id: session_id.to_string(),
                text: text.to_string(),
                kind: classify_input_type(text),
            });
            if state.buffer.len() >= MAX_BUFFERED_ENTRIES {
                true
            } else {
                if state.pending_flush.is_none() {
                    let logger = self.clone();
                    state.pending_flush = Some(tokio::spawn(async move {
                        tokio::time::sleep(FLUSH_DELAY).await;
                        // Clear our own handle first so flush() does not
                        // abort the task that is doing the flushing.
                        logger.state.lock().await.pending_flush = None;
                        logger.flush().await;
                    }));
                }
                false
            }
        };
        if flush_now {
            self.flush().await;
        }
    }

    /// Take the whole buffer and persist it, one sink call per entry.
    /// An entry that fails to persist is reported and skipped; the rest
    /// of the batch still goes out. Cancels any pending timer flush.
    pub async fn flush(&self) {
        let (workspace, entries) = {
            let mut state = self.state.lock().await;
            if let Some(handle) = state.pending_flush.take() {
                handle.abort();
            }
            let Some(workspace) = state.workspace.clone() else {
                return;
            };
            (workspace, std::mem::take(&mut state.buffer))
        };

        if entries.is_empty() {
            return;
        }

        let log_id = Utc::now().format("%Y-%m-%d").to_string();
        for entry in &entries {
            if let Err(e) = self.sink.persist(&workspace, &log_id, entry).await {
                tracing::warn!(error = %e, "failed to persist input log entry");
            }
        }
    }

    /// Flush whatever is buffered, then unbind the workspace
    pub async fn stop(&self) {
        self.flush().await;
        self.state.lock().await.workspace = None;
    }

    #[cfg(test)]
    async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingSink {
        persisted: StdMutex<Vec<(String, String)>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl LogSink for CountingSink {
        async fn persist(
            &self,
            _workspace: &Path,
            log_id: &str,
            entry: &InputLogEntry,
        ) -> Result<()> {
            let mut persisted = self.persisted.lock().unwrap();
            if self.fail_on == Some(persisted.len()) {
                persisted.push((log_id.to_string(), "<failed>".to_string()));
                bail!("disk full");
            }
            persisted.push((log_id.to_string(), entry.text.clone()));
            Ok(())
        }
    }

    fn logger() -> (AuditLogger, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink::default());
        (AuditLogger::new(sink.clone()), sink)
    }

    #[test]
    fn classification_precedence() {
        assert_eq!(classify_input_type("\r"), InputKind::Enter);
        assert_eq!(classify_input_type("\n"), InputKind::Enter);
        assert_eq!(classify_input_type("\r\n"), InputKind::Enter);
        assert_eq!(classify_input_type("ls\r"), InputKind::Command);
        assert_eq!(classify_input_type("git status\n"), InputKind::Command);
        assert_eq!(classify_input_type("1234567890"), InputKind::Paste);
        assert_eq!(classify_input_type("abc"), InputKind::Keystroke);
        assert_eq!(classify_input_type("a"), InputKind::Keystroke);
        assert_eq!(classify_input_type("123456789"), InputKind::Keystroke);
    }

    #[tokio::test(start_paused = true)]
    async fn log_while_inactive_is_dropped() {
        let (logger, sink) = logger();
        logger.log("x", "t1").await;
        assert_eq!(logger.buffered().await, 0);
        logger.flush().await;
        assert!(sink.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_on_empty_buffer_persists_nothing() {
        let (logger, sink) = logger();
        logger.start("/ws").await;
        logger.flush().await;
        assert!(sink.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flush_batches_entries() {
        let (logger, sink) = logger();
        logger.start("/ws").await;

        logger.log("a", "t1").await;
        logger.log("b", "t1").await;
        assert!(sink.persisted.lock().unwrap().is_empty());

        tokio::time::sleep(FLUSH_DELAY + Duration::from_millis(50)).await;

        let persisted = sink.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].1, "a");
        assert_eq!(persisted[1].1, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn full_buffer_flushes_immediately() {
        let (logger, sink) = logger();
        logger.start("/ws").await;

        for i in 0..MAX_BUFFERED_ENTRIES {
            logger.log(&format!("k{}", i), "t1").await;
        }

        assert_eq!(sink.persisted.lock().unwrap().len(), MAX_BUFFERED_ENTRIES);
        assert_eq!(logger.buffered().await, 0);

        // The canceled timer must not flush the same batch again.
        tokio::time::sleep(FLUSH_DELAY * 2).await;
        assert_eq!(sink.persisted.lock().unwrap().len(), MAX_BUFFERED_ENTRIES);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_flushes_remaining_entries() {
        let (logger, sink) = logger();
        logger.start("/ws").await;

        logger.log("a", "t1").await;
        logger.log("b", "t2").await;
        logger.log("c", "t1").await;
        logger.stop().await;

        assert_eq!(sink.persisted.lock().unwrap().len(), 3);
        assert_eq!(logger.buffered().await, 0);

        // Unbound again: further logging is dropped.
        logger.log("d", "t1").await;
        assert_eq!(logger.buffered().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failed_entry_does_not_abort_the_batch() {
        let sink = Arc::new(CountingSink {
            persisted: StdMutex::new(Vec::new()),
            fail_on: Some(1),
        });
        let logger = AuditLogger::new(sink.clone());
        logger.start("/ws").await;

        logger.log("a", "t1").await;
        logger.log("b", "t1").await;
        logger.log("c", "t1").await;
        logger.flush().await;

        let persisted = sink.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 3);
        assert_eq!(persisted[2].1, "c");
        assert_eq!(logger.buffered().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn log_id_is_a_utc_date() {
        let (logger, sink) = logger();
        logger.start("/ws").await;
        logger.log("a", "t1").await;
        logger.flush().await;

        let persisted = sink.persisted.lock().unwrap();
        let log_id = &persisted[0].0;
        assert_eq!(log_id.len(), 10);
        assert_eq!(log_id.as_bytes()[4], b'-');
        assert_eq!(log_id.as_bytes()[7], b'-');
    }
}
