use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};
use std::collections::BTreeMap;

use crate::actions::Action;
use crate::registry::SessionRecord;
use crate::tmux::{AgentActivity, TmuxSession};

/// Theme colors inspired by Claude Code
pub struct Theme {
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

/// Input mode for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing a name for a new agent
    Launching,
    /// Confirming a session kill
    Confirming,
    /// Keystrokes go to the attached session
    Forwarding,
}

/// Main application state
pub struct App {
    /// Sessions as last reported by tmux
    pub sessions: Vec<TmuxSession>,
    /// Registry records keyed by session id (worktree, missing flag)
    pub records: BTreeMap<String, SessionRecord>,
    /// Currently selected session index
    pub list_state: ListState,
    /// Current message to display (info or error)
    pub message: Option<String>,
    /// Theme
    pub theme: Theme,
    /// Current input mode
    pub input_mode: InputMode,
    /// Text input buffer for the launch dialog
    pub input_buffer: String,
    /// Session currently attached (visible + polled), set by main after
    /// the coordinator succeeds
    pub attached: Option<String>,
    /// Latest captured pane content for the attached session
    pub preview: String,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
}

impl App {
    pub fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            sessions: Vec::new(),
            records: BTreeMap::new(),
            list_state,
            message: None,
            theme: Theme::default(),
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            attached: None,
            preview: String::new(),
            pending_actions: Vec::new(),
        }
    }

    /// Get the currently selected session
    pub fn selected_session(&self) -> Option<&TmuxSession> {
        self.list_state
            .selected()
            .and_then(|i| self.sessions.get(i))
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::SessionsUpdated(sessions) => {
                self.sessions = sessions;
                // Ensure selection is valid
                if let Some(selected) = self.list_state.selected() {
                    if selected >= self.sessions.len() && !self.sessions.is_empty() {
                        self.list_state.select(Some(self.sessions.len() - 1));
                    }
                }
                Ok(false)
            }
            Action::RecordsUpdated(records) => {
                self.records = records;
                Ok(false)
            }
            Action::PreviewUpdated {
                session_id,
                content,
            } => {
                if self.attached.as_deref() == Some(session_id.as_str()) {
                    self.preview = content;
                }
                Ok(false)
            }
            Action::Error(msg) => {
                self.message = Some(msg);
                Ok(false)
            }
            Action::Quit => Ok(true),
            _ => Ok(false),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear transient message on any key press
        if self.message.is_some() && self.input_mode == InputMode::Normal {
            self.message = None;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Launching => self.handle_launching_key(key),
            InputMode::Confirming => self.handle_confirming_key(key),
            InputMode::Forwarding => self.handle_forwarding_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => self.next_session(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_session(),
            KeyCode::Enter => {
                if let Some(session) = self.selected_session() {
                    self.pending_actions
                        .push(Action::AttachSession(session.name.clone()));
                }
            }
            KeyCode::Char('n') => {
                self.input_mode = InputMode::Launching;
                self.input_buffer.clear();
            }
            KeyCode::Char('d') => {
                if self.selected_session().is_some() {
                    self.input_mode = InputMode::Confirming;
                }
            }
            KeyCode::Char('i') => {
                if self.attached.is_some() {
                    self.input_mode = InputMode::Forwarding;
                } else {
                    self.message = Some("Attach a session first (Enter)".to_string());
                }
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_launching_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Enter => {
                if !self.input_buffer.is_empty() {
                    let name = self.input_buffer.clone();
                    self.pending_actions.push(Action::LaunchAgent(name));
                    self.input_buffer.clear();
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char(c) => {
                // Only allow valid session name characters
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    self.input_buffer.push(c);
                }
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_confirming_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(session) = self.selected_session() {
                    self.pending_actions
                        .push(Action::DeleteSession(session.name.clone()));
                }
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_forwarding_key(&mut self, key: KeyEvent) -> Result<bool> {
        let Some(session_id) = self.attached.clone() else {
            self.input_mode = InputMode::Normal;
            return Ok(false);
        };

        let text = match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                return Ok(false);
            }
            KeyCode::Enter => "\r".to_string(),
            KeyCode::Backspace => "\u{7f}".to_string(),
            KeyCode::Tab => "\t".to_string(),
            KeyCode::Char(c) => c.to_string(),
            _ => return Ok(false),
        };

        self.pending_actions
            .push(Action::SendInput { session_id, text });
        Ok(false)
    }

    fn next_session(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => {
                if i >= self.sessions.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous_session(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => {
                if i == 0 {
                    self.sessions.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);

        // Render modal dialogs on top
        match self.input_mode {
            InputMode::Launching => self.render_launch_dialog(frame),
            InputMode::Confirming => self.render_confirm_dialog(frame),
            InputMode::Normal | InputMode::Forwarding => {}
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " LoomDeck ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                "│ Isolated worktrees for concurrent agents",
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(35), // Session list
                Constraint::Percentage(65), // Preview pane
            ])
            .split(area);

        self.render_session_list(frame, chunks[0]);
        self.render_preview_pane(frame, chunks[1]);
    }

    fn render_session_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.sessions.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No agents running. Press 'n' to launch one.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            let theme = &self.theme;
            let records = &self.records;
            let attached_id = self.attached.as_deref();
            self.sessions
                .iter()
                .map(|session| {
                    let icon = activity_icon(theme, records, session);
                    let attached = attached_id == Some(session.name.as_str());
                    let name_style = if attached {
                        Style::default()
                            .fg(theme.accent)
                            .add_modifier(Modifier::BOLD)
                    } else {
                        Style::default().fg(theme.fg)
                    };
                    let mut spans = vec![icon, Span::styled(&session.name, name_style)];
                    if attached {
                        spans.push(Span::styled(
                            " [attached]",
                            Style::default().fg(theme.dim),
                        ));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Agents ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_preview_pane(&self, frame: &mut Frame, area: Rect) {
        let (title, border_color) = match (&self.attached, &self.input_mode) {
            (Some(id), InputMode::Forwarding) => {
                (format!(" {} — typing ", id), self.theme.accent)
            }
            (Some(id), _) => (format!(" {} ", id), self.theme.dim),
            (None, _) => (" Preview ".to_string(), self.theme.dim),
        };

        let content = if self.attached.is_some() {
            let height = area.height.saturating_sub(2) as usize;
            let lines: Vec<&str> = self.preview.lines().collect();
            let skip = lines.len().saturating_sub(height);
            lines
                .into_iter()
                .skip(skip)
                .map(|l| Line::from(l.to_string()))
                .collect::<Vec<_>>()
        } else {
            vec![
                Line::from(Span::styled(
                    "No session attached",
                    Style::default().fg(self.theme.dim),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter: attach │ i: type into the agent",
                    Style::default().fg(self.theme.dim),
                )),
            ]
        };

        let preview = Paragraph::new(content).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color)),
        );
        frame.render_widget(preview, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = match self.input_mode {
            InputMode::Forwarding => " typing → agent │ Esc: stop ",
            _ => " q: Quit │ j/k: Navigate │ Enter: Attach │ i: Type │ n: Launch │ d: Kill ",
        };

        let content = if let Some(ref msg) = self.message {
            let style = if msg.contains("started") || msg.contains("created") {
                Style::default().fg(self.theme.success)
            } else {
                Style::default().fg(self.theme.error)
            };
            Line::from(Span::styled(format!(" {} ", msg), style))
        } else {
            Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim)))
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }

    fn render_launch_dialog(&self, frame: &mut Frame) {
        let area = centered_rect(50, 20, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Launch Agent ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.accent));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                "Agent name (gets its own worktree):",
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("▶ loom-{}_", self.input_buffer),
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press Enter to launch, Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];

        let paragraph = Paragraph::new(text);
        frame.render_widget(paragraph, inner);
    }

    fn render_confirm_dialog(&self, frame: &mut Frame) {
        let area = centered_rect(50, 20, frame.area());

        frame.render_widget(Clear, area);

        let block = Block::default()
            .title(" Confirm Kill ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.error));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let session_name = self
            .selected_session()
            .map(|s| s.name.as_str())
            .unwrap_or("unknown");

        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("Kill session '{}'?", session_name),
                Style::default().fg(self.theme.fg),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Its worktree is cleaned up by the registry later.",
                Style::default().fg(self.theme.warning),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Press 'y' to confirm, 'n' or Esc to cancel",
                Style::default().fg(self.theme.dim),
            )),
        ];

        let paragraph = Paragraph::new(text);
        frame.render_widget(paragraph, inner);
    }
}

/// Status badge for one session: a registry-recorded missing session
/// outranks whatever the pane content suggests.
fn activity_icon(
    theme: &Theme,
    records: &BTreeMap<String, SessionRecord>,
    session: &TmuxSession,
) -> Span<'static> {
    if records
        .get(&session.name)
        .is_some_and(|r| r.missing_session)
    {
        return Span::styled("✗ ", Style::default().fg(theme.error));
    }
    match session.activity {
        AgentActivity::Working => Span::styled("● ", Style::default().fg(theme.warning)),
        AgentActivity::Idle => Span::styled("● ", Style::default().fg(theme.success)),
        AgentActivity::AwaitingInput => Span::styled("? ", Style::default().fg(theme.accent)),
        AgentActivity::Errored => Span::styled("✗ ", Style::default().fg(theme.error)),
        AgentActivity::Unknown => Span::styled("○ ", Style::default().fg(theme.dim)),
    }
}

/// Helper function to create a centered rectangle
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
