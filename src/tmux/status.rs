use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What an agent appears to be doing, judged from its pane tail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AgentActivity {
    /// Streaming output, spinner visible, tool call in flight
    Working,
    /// Sitting at a prompt with nothing pending
    Idle,
    /// Asking the user a question or waiting for confirmation
    AwaitingInput,
    /// The last visible lines look like a failure
    Errored,
    #[default]
    Unknown,
}

static RE_AWAITING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(\[y/n\]|\(y/N\)|\(Y/n\)|Do you want|Allow this|Press Enter to continue|awaiting your|^\s*>\s*$)")
        .unwrap()
});

static RE_WORKING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(⠋|⠙|⠹|⠸|⠼|⠴|⠦|⠧|⠇|⠏|✻|Thinking|Running tool|Streaming|tokens/s|esc to interrupt)")
        .unwrap()
});

static RE_ERRORED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(^error[:!]|^fatal:|panicked at|Traceback \(most recent|command not found|API error)")
        .unwrap()
});

static RE_IDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^\$\s*$|^❯\s*$|^%\s*$|^╰|bypass permissions)").unwrap());

/// How much of the pane tail is considered. Anything older than a
/// screenful describes what the agent *was* doing.
const TAIL_LINES: usize = 25;

/// Infer activity from captured pane content. Ties break toward the
/// more urgent state: errors beat questions beat spinners beat prompts.
pub fn infer_activity(pane: &str) -> AgentActivity {
    let skip = pane.lines().count().saturating_sub(TAIL_LINES);
    let tail: String = pane
        .lines()
        .skip(skip)
        .collect::<Vec<_>>()
        .join("\n");

    if RE_ERRORED.is_match(&tail) {
        AgentActivity::Errored
    } else if RE_AWAITING.is_match(&tail) {
        AgentActivity::AwaitingInput
    } else if RE_WORKING.is_match(&tail) {
        AgentActivity::Working
    } else if RE_IDLE.is_match(&tail) {
        AgentActivity::Idle
    } else {
        AgentActivity::Unknown
    }
}
