use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditLogger;

/// Pacing delay after every executed command. The transport has no
/// response signal, so back-to-back commands would otherwise land in the
/// session's input stream before the previous one finished echoing and
/// concatenate into one line.
pub const COMMAND_SETTLE: Duration = Duration::from_millis(300);

/// Raw text transport into a named terminal session
#[async_trait]
pub trait InputTransport: Send + Sync {
    /// Send literal text without executing it
    async fn send_text(&self, session_id: &str, text: &str) -> Result<()>;
    /// Send the execute (Enter) signal
    async fn send_enter(&self, session_id: &str) -> Result<()>;
}

/// Sends command lines to a session: text, then Enter, then a settle
/// delay before the next command may be issued. Shared by interactive
/// input and by worktree provisioning.
pub struct CommandChannel {
    transport: Arc<dyn InputTransport>,
    settle: Duration,
    audit: Option<AuditLogger>,
}

impl CommandChannel {
    pub fn new(transport: Arc<dyn InputTransport>) -> Self {
        Self {
            transport,
            settle: COMMAND_SETTLE,
            audit: None,
        }
    }

    /// Record everything sent through this channel, interactive input
    /// and provisioning commands alike.
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Execute one command line in the session and wait for the settle
    /// delay to elapse before returning.
    pub async fn run_command(&self, session_id: &str, line: &str) -> Result<()> {
        self.transport.send_text(session_id, line).await?;
        self.transport.send_enter(session_id).await?;
        if let Some(audit) = &self.audit {
            audit.log(&format!("{}\r", line), session_id).await;
        }
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Pass interactive input straight through, no Enter and no pacing.
    pub async fn send_raw(&self, session_id: &str, text: &str) -> Result<()> {
        self.transport.send_text(session_id, text).await?;
        if let Some(audit) = &self.audit {
            audit.log(text, session_id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InputTransport for RecordingTransport {
        async fn send_text(&self, session_id: &str, text: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("text {} {}", session_id, text));
            Ok(())
        }

        async fn send_enter(&self, session_id: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("enter {}", session_id));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_command_sends_text_then_enter() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = CommandChannel::new(transport.clone());

        channel.run_command("s1", "git status").await.unwrap();

        let calls = transport.calls.lock().unwrap();
        assert_eq!(*calls, vec!["text s1 git status", "enter s1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_command_waits_for_settle_delay() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = CommandChannel::new(transport);

        let before = tokio::time::Instant::now();
        channel.run_command("s1", "ls").await.unwrap();
        assert!(before.elapsed() >= COMMAND_SETTLE);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_traffic_is_audit_logged() {
        use crate::audit::{InputKind, InputLogEntry, LogSink};
        use std::path::Path;

        #[derive(Default)]
        struct CapturingSink {
            entries: Mutex<Vec<InputLogEntry>>,
        }

        #[async_trait]
        impl LogSink for CapturingSink {
            async fn persist(
                &self,
                _workspace: &Path,
                _log_id: &str,
                entry: &InputLogEntry,
            ) -> Result<()> {
                self.entries.lock().unwrap().push(entry.clone());
                Ok(())
            }
        }

        let sink = Arc::new(CapturingSink::default());
        let audit = AuditLogger::new(sink.clone());
        audit.start("/ws").await;

        let channel =
            CommandChannel::new(Arc::new(RecordingTransport::default())).with_audit(audit.clone());
        channel.run_command("s1", "git status").await.unwrap();
        channel.send_raw("s1", "y").await.unwrap();
        audit.stop().await;

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "git status\r");
        assert_eq!(entries[0].kind, InputKind::Command);
        assert_eq!(entries[1].kind, InputKind::Keystroke);
        assert_eq!(entries[1].session_id, "s1");
    }

    #[tokio::test(start_paused = true)]
    async fn send_raw_skips_enter_and_pacing() {
        let transport = Arc::new(RecordingTransport::default());
        let channel = CommandChannel::new(transport.clone());

        let before = tokio::time::Instant::now();
        channel.send_raw("s1", "a").await.unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);

        let calls = transport.calls.lock().unwrap();
        assert_eq!(*calls, vec!["text s1 a"]);
    }
}
