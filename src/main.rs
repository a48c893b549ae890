use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

mod actions;
mod app;
mod audit;
mod registry;
mod session;
mod tmux;

use actions::Action;
use app::App;
use audit::{AuditLogger, JsonlSink};
use registry::FileRegistry;
use session::{
    AttachmentCoordinator, CommandChannel, Identity, SessionRecordUpdate, SessionRegistry,
    SessionStatus, WorktreeProvisioner,
};
use tmux::{TmuxBackend, TmuxClient};

/// Git identity for provisioned worktrees, taken from the environment
fn identity_from_env() -> Option<Identity> {
    let name = std::env::var("LOOM_GIT_NAME").ok()?;
    let email = std::env::var("LOOM_GIT_EMAIL").ok()?;
    Some(Identity { name, email })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let workspace: PathBuf = std::env::current_dir()
        .context("Failed to resolve working directory")?
        .canonicalize()
        .context("Failed to canonicalize working directory")?;
    let agent_command =
        std::env::var("LOOM_AGENT_CMD").unwrap_or_else(|_| "claude".to_string());
    let identity = identity_from_env();

    // Wire up the session manager
    let audit = AuditLogger::new(Arc::new(JsonlSink));
    audit.start(&workspace).await;

    let client = Arc::new(TmuxClient::new());
    let backend = Arc::new(TmuxBackend::new(client.clone()));
    let registry = Arc::new(FileRegistry::new(&workspace));
    let channel = Arc::new(CommandChannel::new(client.clone()).with_audit(audit.clone()));
    let provisioner = WorktreeProvisioner::new(channel.clone(), registry.clone());
    let mut coordinator = AttachmentCoordinator::new(backend.clone(), registry.clone());

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(evt) = event::read() {
                    if let Event::Key(key) = evt {
                        if key.kind == KeyEventKind::Press {
                            let _ = input_tx.send(Action::KeyPress(key));
                        }
                    }
                }
            }
        }
    });

    // Spawn the refresh loop: session list, registry records, and pane
    // content for whichever single session is being polled
    let refresh_tx = tx.clone();
    let refresh_client = client.clone();
    let refresh_backend = backend.clone();
    let refresh_registry = registry.clone();
    tokio::spawn(async move {
        loop {
            match refresh_client.list_sessions().await {
                Ok(sessions) => {
                    let _ = refresh_tx.send(Action::SessionsUpdated(sessions));
                }
                Err(e) => {
                    let _ = refresh_tx.send(Action::Error(format!("Tmux: {}", e)));
                }
            }

            if let Ok(records) = refresh_registry.records().await {
                let _ = refresh_tx.send(Action::RecordsUpdated(records));
            }

            if let Some(session_id) = refresh_backend.polled_session().await {
                if let Ok(content) = refresh_client.capture_pane(&session_id).await {
                    let _ = refresh_tx.send(Action::PreviewUpdated {
                        session_id,
                        content,
                    });
                }
            }

            tokio::time::sleep(Duration::from_millis(1000)).await;
        }
    });

    // Create app state
    let mut app = App::new();

    // Main event loop
    let result = loop {
        // Render
        terminal.draw(|f| app.render(f))?;

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::AttachSession(ref session_id) => {
                    match coordinator.attach(session_id).await {
                        Ok(()) => {
                            app.attached = coordinator.attached().map(str::to_string);
                            if app.attached.is_none() {
                                app.message =
                                    Some(format!("Session '{}' is gone", session_id));
                            }
                        }
                        Err(e) => {
                            app.message = Some(format!("Failed to attach: {}", e));
                        }
                    }
                }
                Action::LaunchAgent(ref name) => {
                    let session_name = format!("loom-{}", name);
                    match client.create_session(&session_name, &workspace).await {
                        Ok(_) => {
                            match provisioner
                                .provision(&session_name, &workspace, identity.as_ref())
                                .await
                            {
                                Ok(path) => {
                                    let _ = registry
                                        .update_session_record(
                                            &session_name,
                                            SessionRecordUpdate {
                                                status: Some(SessionStatus::Active),
                                                missing_session: Some(false),
                                            },
                                        )
                                        .await;
                                    // The shell is sitting in the fresh
                                    // worktree; start the agent there.
                                    if let Err(e) =
                                        channel.run_command(&session_name, &agent_command).await
                                    {
                                        app.message =
                                            Some(format!("Failed to start agent: {}", e));
                                    } else {
                                        app.message = Some(format!(
                                            "Agent '{}' started in {}",
                                            name,
                                            path.display()
                                        ));
                                        // Attach on the next pass, once the
                                        // session exists everywhere.
                                        app.pending_actions
                                            .push(Action::AttachSession(session_name.clone()));
                                    }
                                }
                                Err(e) => {
                                    // Abort the launch; the half-made
                                    // session must not look usable.
                                    let _ = client.kill_session(&session_name).await;
                                    app.message =
                                        Some(format!("Worktree provisioning failed: {}", e));
                                }
                            }
                        }
                        Err(e) => {
                            app.message = Some(format!("Failed to create session: {}", e));
                        }
                    }
                }
                Action::DeleteSession(ref session_id) => {
                    match client.kill_session(session_id).await {
                        Ok(_) => {
                            if app.attached.as_deref() == Some(session_id.as_str()) {
                                app.attached = None;
                                app.preview.clear();
                            }
                            app.message = Some("Session killed".to_string());
                        }
                        Err(e) => {
                            app.message = Some(format!("Failed to kill: {}", e));
                        }
                    }
                }
                Action::SendInput {
                    ref session_id,
                    ref text,
                } => {
                    if let Err(e) = channel.send_raw(session_id, text).await {
                        app.message = Some(format!("Input failed: {}", e));
                    }
                }
                _ => {}
            }
        }

        // Handle events from channel
        tokio::select! {
            Some(action) = rx.recv() => {
                match app.handle_action(action) {
                    Ok(should_quit) => {
                        if should_quit {
                            break Ok(());
                        }
                    }
                    Err(e) => {
                        break Err(e);
                    }
                }
            }
        }
    };

    // Flush the audit trail and drop attach/probe state before leaving
    audit.stop().await;
    coordinator.reset();

    // Restore terminal
    ratatui::restore();
    result
}
