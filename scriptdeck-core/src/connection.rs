use std::fmt;

/// What the connection indicator shows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Push channel is up
    Push,
    /// Push is down or unavailable, the latest poll succeeded
    PollOnly,
    /// The latest poll failed and push is not up
    Disconnected,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Push => "connected (ws)",
            Self::PollOnly => "connected (http)",
            Self::Disconnected => "disconnected",
        }
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum PollOutcome {
    #[default]
    Pending,
    Ok,
    Failed,
}

/// Derives the connection indicator from push and poll outcomes.
///
/// Push disconnect never affects polling; it only downgrades the label.
#[derive(Clone, Debug)]
pub struct ConnectionTracker {
    push_connected: bool,
    push_available: bool,
    last_poll: PollOutcome,
    consecutive_poll_failures: u32,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self {
            push_connected: false,
            push_available: true,
            last_poll: PollOutcome::Pending,
            consecutive_poll_failures: 0,
        }
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        if self.push_connected {
            ConnectionState::Push
        } else if self.last_poll == PollOutcome::Failed {
            ConnectionState::Disconnected
        } else {
            ConnectionState::PollOnly
        }
    }

    pub fn push_connected(&mut self) {
        self.push_connected = true;
    }

    pub fn push_disconnected(&mut self) {
        self.push_connected = false;
    }

    /// Reconnect budget exhausted or push disabled; stays poll-only for the session
    pub fn push_unavailable(&mut self) {
        self.push_connected = false;
        self.push_available = false;
    }

    pub fn poll_succeeded(&mut self) {
        self.last_poll = PollOutcome::Ok;
        self.consecutive_poll_failures = 0;
    }

    pub fn poll_failed(&mut self) {
        self.last_poll = PollOutcome::Failed;
        self.consecutive_poll_failures += 1;
    }

    /// A user request hit a network error; the next successful poll clears it
    pub fn request_failed(&mut self) {
        self.last_poll = PollOutcome::Failed;
    }

    pub fn is_push_connected(&self) -> bool {
        self.push_connected
    }

    pub fn is_push_available(&self) -> bool {
        self.push_available
    }

    pub fn consecutive_poll_failures(&self) -> u32 {
        self.consecutive_poll_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_poll_only() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.state(), ConnectionState::PollOnly);
        assert!(tracker.is_push_available());
    }

    #[test]
    fn test_request_failure_degrades_until_next_poll() {
        let mut tracker = ConnectionTracker::new();
        tracker.poll_succeeded();
        tracker.request_failed();
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        assert_eq!(tracker.consecutive_poll_failures(), 0);
        tracker.poll_succeeded();
        assert_eq!(tracker.state(), ConnectionState::PollOnly);
    }

    #[test]
    fn test_push_wins_over_failed_poll() {
        let mut tracker = ConnectionTracker::new();
        tracker.push_connected();
        tracker.poll_failed();
        assert_eq!(tracker.state(), ConnectionState::Push);
        assert_eq!(tracker.state().label(), "connected (ws)");
    }

    #[test]
    fn test_push_drop_downgrades_indicator() {
        let mut tracker = ConnectionTracker::new();
        tracker.push_connected();
        tracker.poll_succeeded();
        tracker.push_disconnected();
        assert_eq!(tracker.state(), ConnectionState::PollOnly);
        assert_eq!(tracker.state().to_string(), "connected (http)");

        tracker.poll_failed();
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        assert!(!tracker.state().is_connected());
    }

    #[test]
    fn test_poll_recovery_resets_failures() {
        let mut tracker = ConnectionTracker::new();
        tracker.poll_failed();
        tracker.poll_failed();
        assert_eq!(tracker.consecutive_poll_failures(), 2);
        tracker.poll_succeeded();
        assert_eq!(tracker.consecutive_poll_failures(), 0);
        assert_eq!(tracker.state(), ConnectionState::PollOnly);
    }

    #[test]
    fn test_unavailable_is_permanent() {
        let mut tracker = ConnectionTracker::new();
        tracker.push_connected();
        tracker.push_unavailable();
        assert!(!tracker.is_push_available());
        assert!(!tracker.is_push_connected());
    }
}
