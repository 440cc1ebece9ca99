use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// How long a notification stays on screen
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);
const MAX_NOTIFICATIONS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
    pub expires_at: Instant,
}

/// Bounded queue of transient notifications; oldest are dropped first
#[derive(Debug, Default)]
pub struct Notifications {
    queue: VecDeque<Notification>,
    next_id: u64,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if self.queue.len() == MAX_NOTIFICATIONS {
            self.queue.pop_front();
        }
        self.queue.push_back(Notification {
            id,
            severity,
            message: message.into(),
            expires_at: now + NOTIFICATION_TTL,
        });
        id
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.queue.len();
        self.queue.retain(|n| n.id != id);
        before != self.queue.len()
    }

    /// Dismiss the newest notification, if any
    pub fn dismiss_latest(&mut self) -> bool {
        self.queue.pop_back().is_some()
    }

    pub fn expire(&mut self, now: Instant) {
        self.queue.retain(|n| n.expires_at > now);
    }

    pub fn active(&self) -> impl Iterator<Item = &Notification> {
        self.queue.iter()
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.queue.back()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_after_ttl() {
        let now = Instant::now();
        let mut n = Notifications::new();
        n.push(Severity::Info, "hello", now);
        n.expire(now + Duration::from_secs(2));
        assert_eq!(n.len(), 1);
        n.expire(now + NOTIFICATION_TTL);
        assert!(n.is_empty());
    }

    #[test]
    fn test_bounded_queue_drops_oldest() {
        let now = Instant::now();
        let mut n = Notifications::new();
        for i in 0..7 {
            n.push(Severity::Warning, format!("m{}", i), now);
        }
        assert_eq!(n.len(), MAX_NOTIFICATIONS);
        assert_eq!(n.active().next().unwrap().message, "m2");
        assert_eq!(n.latest().unwrap().message, "m6");
    }

    #[test]
    fn test_dismiss() {
        let now = Instant::now();
        let mut n = Notifications::new();
        let a = n.push(Severity::Error, "a", now);
        n.push(Severity::Success, "b", now);
        assert!(n.dismiss(a));
        assert!(!n.dismiss(a));
        assert!(n.dismiss_latest());
        assert!(n.is_empty());
    }
}
