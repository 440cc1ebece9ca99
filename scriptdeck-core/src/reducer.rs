//! Session state and the single entry point that mutates it
//!
//! Transports and request tasks never touch the session directly; they send
//! [`EventEnvelope`]s to the task that owns it, which calls [`reduce`] and
//! executes the returned [`Effect`]s.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionState, ConnectionTracker};
use crate::error::{ClientError, ErrorKind};
use crate::log_view::{LogRenderer, LogTarget};
use crate::model::{ControlAction, ScriptConfig, ScriptId, SnapshotSource, StatusSnapshot};
use crate::notify::{Notifications, Severity};
use crate::state::Reconciler;

/// A request the user issued, echoed back with its outcome
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Control { id: ScriptId, action: ControlAction },
    StartAll,
    StopAll,
    Add { path: String },
    Remove { id: ScriptId },
    Update { id: ScriptId },
}

impl Action {
    pub fn describe(&self) -> String {
        match self {
            Self::Control { id, action } => format!("{} {}", action, id),
            Self::StartAll => "start all".into(),
            Self::StopAll => "stop all".into(),
            Self::Add { path } => format!("add {}", path),
            Self::Remove { id } => format!("remove {}", id),
            Self::Update { id } => format!("update {}", id),
        }
    }

    /// Actions that change the inventory itself
    fn touches_inventory(&self) -> bool {
        matches!(self, Self::Add { .. } | Self::Remove { .. } | Self::Update { .. })
    }
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Complete status listing from either channel
    Snapshot(StatusSnapshot),
    /// Live log line delivered over push
    PushLine { script_id: ScriptId, message: String },
    PushConnected,
    PushDisconnected,
    /// Push is disabled or its reconnect budget is spent
    PushUnavailable { reason: String },
    PollFailed(ClientError),
    /// Full window for a freshly selected target
    LogsFetched {
        target: LogTarget,
        result: Result<Vec<String>, ClientError>,
    },
    /// Auto-refresh window to merge into the buffer
    LogTail {
        target: LogTarget,
        result: Result<Vec<String>, ClientError>,
    },
    ActionCompleted {
        action: Action,
        result: Result<(), ClientError>,
    },
    InventoryFetched(Result<Vec<ScriptConfig>, ClientError>),
    VisibilityChanged(bool),
    SelectTarget(LogTarget),
    /// Housekeeping tick for notification expiry
    Tick,
}

#[derive(Clone, Debug)]
pub struct EventEnvelope {
    pub id: u64,
    pub at: Instant,
    pub event: SessionEvent,
}

/// Work the session owner must start on the reducer's behalf
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    FetchStatus,
    FetchInventory,
    FetchLogs(LogTarget),
    /// Begin repeating tail fetches for the target
    StartFollow(LogTarget),
    StopFollow,
}

/// Everything one client session owns
#[derive(Debug)]
pub struct Session {
    pub reconciler: Reconciler,
    pub logs: LogRenderer,
    pub connection: ConnectionTracker,
    pub notifications: Notifications,
    pub inventory: Vec<ScriptConfig>,
    pub last_event_id: u64,
    visible: bool,
    following: Option<LogTarget>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            reconciler: Reconciler::new(),
            logs: LogRenderer::new(),
            connection: ConnectionTracker::new(),
            notifications: Notifications::new(),
            inventory: Vec::new(),
            last_event_id: 0,
            visible: true,
            following: None,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Target currently being auto-refreshed
    pub fn following(&self) -> Option<&LogTarget> {
        self.following.as_ref()
    }

    /// Auto-refresh runs only for a visible, running script target
    fn wants_follow(&self) -> Option<LogTarget> {
        if !self.visible {
            return None;
        }
        let id = self.logs.target().script_id()?;
        self.reconciler
            .is_running(id)
            .then(|| self.logs.target().clone())
    }

    fn sync_follow(&mut self, effects: &mut Vec<Effect>) {
        let wanted = self.wants_follow();
        if wanted == self.following {
            return;
        }
        if self.following.take().is_some() {
            effects.push(Effect::StopFollow);
        }
        if let Some(target) = wanted {
            effects.push(Effect::StartFollow(target.clone()));
            self.following = Some(target);
        }
    }

    fn report(&mut self, action: &Action, err: &ClientError, now: Instant, effects: &mut Vec<Effect>) {
        match err.kind() {
            ErrorKind::Network => {
                warn!(action = %action.describe(), error = %err, "request failed");
                self.connection.request_failed();
                self.notifications.push(
                    Severity::Error,
                    format!("{} failed: {}", action.describe(), err),
                    now,
                );
            }
            ErrorKind::Application => {
                info!(action = %action.describe(), error = %err, "backend rejected request");
                self.notifications.push(Severity::Error, err.to_string(), now);
            }
            ErrorKind::NotFound => {
                info!(action = %action.describe(), error = %err, "script vanished");
                self.notifications.push(Severity::Warning, err.to_string(), now);
                effects.push(Effect::FetchInventory);
            }
        }
    }
}

pub fn reduce(session: &mut Session, env: &EventEnvelope) -> Vec<Effect> {
    session.last_event_id = env.id;
    let now = env.at;
    let mut effects = Vec::new();

    match &env.event {
        SessionEvent::Snapshot(snapshot) => {
            if snapshot.source == SnapshotSource::Poll {
                session.connection.poll_succeeded();
            }
            session.reconciler.apply(snapshot.clone());
        }
        SessionEvent::PushLine { script_id, message } => {
            if session.logs.target().id() == script_id {
                for line in message.lines() {
                    session.logs.append(line);
                }
            }
        }
        SessionEvent::PushConnected => {
            info!("push channel connected");
            session.connection.push_connected();
            session
                .notifications
                .push(Severity::Success, "Connected to server", now);
        }
        SessionEvent::PushDisconnected => {
            if session.connection.is_push_connected() {
                warn!("push channel disconnected");
                session
                    .notifications
                    .push(Severity::Warning, "Disconnected from server", now);
            }
            session.connection.push_disconnected();
        }
        SessionEvent::PushUnavailable { reason } => {
            info!(reason = %reason, "falling back to polling");
            session.connection.push_unavailable();
        }
        SessionEvent::PollFailed(err) => {
            warn!(error = %err, failures = session.connection.consecutive_poll_failures() + 1, "status poll failed");
            session.connection.poll_failed();
        }
        SessionEvent::LogsFetched { target, result } => {
            session.logs.apply_fetch(target, result.clone());
        }
        SessionEvent::LogTail { target, result } => {
            if target == session.logs.target() {
                match result {
                    Ok(window) => {
                        let added = session.logs.merge_tail(window);
                        debug!(target_id = %target.id(), added, "merged log tail");
                    }
                    Err(err) => session.logs.fetch_failed(err),
                }
            }
        }
        SessionEvent::ActionCompleted { action, result } => {
            match result {
                Ok(()) => {
                    session.notifications.push(
                        Severity::Success,
                        format!("{}: done", action.describe()),
                        now,
                    );
                    if action.touches_inventory() {
                        effects.push(Effect::FetchInventory);
                    }
                }
                Err(err) => session.report(action, err, now, &mut effects),
            }
            effects.push(Effect::FetchStatus);
        }
        SessionEvent::InventoryFetched(result) => match result {
            Ok(scripts) => session.inventory = scripts.clone(),
            Err(err) => warn!(error = %err, "inventory fetch failed"),
        },
        SessionEvent::VisibilityChanged(visible) => {
            session.visible = *visible;
        }
        SessionEvent::SelectTarget(target) => {
            if session.logs.select(target.clone()) {
                effects.push(Effect::FetchLogs(target.clone()));
            }
        }
        SessionEvent::Tick => session.notifications.expire(now),
    }

    session.sync_follow(&mut effects);
    effects
}
