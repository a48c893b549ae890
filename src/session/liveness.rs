use std::collections::HashSet;

/// Remembers which sessions have already had their liveness probed this
/// process run. The UI refresh loop fires roughly once a second; without
/// this gate every tick would re-issue the probe for every visible
/// session.
#[derive(Debug, Default)]
pub struct LivenessTracker {
    checked: HashSet<String>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until `mark_checked` has been called for this id
    pub fn should_probe(&self, session_id: &str) -> bool {
        !self.checked.contains(session_id)
    }

    pub fn mark_checked(&mut self, session_id: &str) {
        self.checked.insert(session_id.to_string());
    }

    /// Forget all probe history (workspace close / engine restart)
    pub fn reset(&mut self) {
        self.checked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_once_per_session() {
        let mut tracker = LivenessTracker::new();
        assert!(tracker.should_probe("t1"));

        tracker.mark_checked("t1");
        assert!(!tracker.should_probe("t1"));
        assert!(tracker.should_probe("t2"));
    }

    #[test]
    fn reset_clears_history() {
        let mut tracker = LivenessTracker::new();
        tracker.mark_checked("t1");
        tracker.reset();
        assert!(tracker.should_probe("t1"));
    }
}
