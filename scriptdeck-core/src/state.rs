use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{ScriptId, ScriptStatus, SnapshotSource, StatusSnapshot};

/// Canonical id → status table
pub type StatusMap = BTreeMap<ScriptId, ScriptStatus>;

/// Totals derived from the status table after every apply
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregates {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
    /// Sum over running entries only
    pub cpu_percent: f64,
    /// Sum over running entries only
    pub memory_mb: f64,
}

impl Aggregates {
    pub fn compute(map: &StatusMap) -> Self {
        map.values().fold(Aggregates::default(), |mut acc, entry| {
            acc.total += 1;
            match entry.stats() {
                Some(stats) => {
                    acc.running += 1;
                    acc.cpu_percent += stats.cpu_percent;
                    acc.memory_mb += stats.memory_mb;
                }
                None => acc.stopped += 1,
            }
            acc
        })
    }
}

/// Payload handed to every registered listener after an apply
#[derive(Debug)]
pub struct StatusChange<'a> {
    pub source: SnapshotSource,
    pub map: &'a StatusMap,
    pub aggregates: &'a Aggregates,
}

pub type StatusListener = Box<dyn FnMut(&StatusChange<'_>)>;

/// Owns the status table and notifies listeners after each snapshot.
///
/// Listeners run in registration order; there is no debouncing.
#[derive(Default)]
pub struct Reconciler {
    map: StatusMap,
    aggregates: Aggregates,
    last_source: Option<SnapshotSource>,
    applied: u64,
    listeners: Vec<StatusListener>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("map", &self.map)
            .field("aggregates", &self.aggregates)
            .field("last_source", &self.last_source)
            .field("applied", &self.applied)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it will run after every earlier registration
    pub fn subscribe(&mut self, listener: impl FnMut(&StatusChange<'_>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Replace the table wholesale with the snapshot's entries.
    ///
    /// Entries absent from the snapshot are dropped. The last snapshot applied
    /// wins regardless of which channel produced it.
    pub fn apply(&mut self, snapshot: StatusSnapshot) {
        self.map = snapshot
            .entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        self.aggregates = Aggregates::compute(&self.map);
        self.last_source = Some(snapshot.source);
        self.applied += 1;

        let change = StatusChange {
            source: snapshot.source,
            map: &self.map,
            aggregates: &self.aggregates,
        };
        for listener in &mut self.listeners {
            listener(&change);
        }
    }

    pub fn map(&self) -> &StatusMap {
        &self.map
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn get(&self, id: &str) -> Option<&ScriptStatus> {
        self.map.get(id)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.map.get(id).is_some_and(ScriptStatus::is_running)
    }

    pub fn last_source(&self) -> Option<SnapshotSource> {
        self.last_source
    }

    /// Number of snapshots applied this session
    pub fn applied_count(&self) -> u64 {
        self.applied
    }
}

/// Elapsed time since start, in the coarsest unit that is at least one.
///
/// Returns `None` for stopped entries. Recomputed on every call since callers
/// pass an advancing `now`.
pub fn uptime(entry: &ScriptStatus, now: DateTime<Utc>) -> Option<String> {
    let start = entry.start_time()?;
    let secs = (now - start).num_seconds().max(0);
    Some(format_elapsed(secs))
}

pub fn format_elapsed(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3_600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3_600)
    } else {
        format!("{}d", secs / 86_400)
    }
}
