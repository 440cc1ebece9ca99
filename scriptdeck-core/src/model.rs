use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub type ScriptId = String;

/// Group assigned to scripts that do not declare one
pub const DEFAULT_GROUP: &str = "Default";

/// Live process figures, only meaningful while a script is running
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessStats {
    pub pid: u32,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub start_time: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScriptState {
    Running(ProcessStats),
    Stopped,
}

/// One entry of a status listing.
///
/// The running-only fields live inside [`ScriptState::Running`], so a stopped
/// script cannot carry a pid or resource figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireStatus", into = "WireStatus")]
pub struct ScriptStatus {
    pub id: ScriptId,
    pub name: String,
    pub group: String,
    pub enabled: bool,
    pub restart_attempts: u32,
    /// Script path on the backend host (informational)
    pub path: Option<String>,
    pub state: ScriptState,
}

impl ScriptStatus {
    pub fn is_running(&self) -> bool {
        matches!(self.state, ScriptState::Running(_))
    }

    pub fn stats(&self) -> Option<&ProcessStats> {
        match &self.state {
            ScriptState::Running(stats) => Some(stats),
            ScriptState::Stopped => None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.stats().map(|s| s.pid)
    }

    pub fn cpu_percent(&self) -> Option<f64> {
        self.stats().map(|s| s.cpu_percent)
    }

    pub fn memory_mb(&self) -> Option<f64> {
        self.stats().map(|s| s.memory_mb)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.stats().map(|s| s.start_time)
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_running() { "running" } else { "stopped" }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireRunState {
    Running,
    #[serde(other)]
    Stopped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireTime {
    Text(String),
    Epoch(f64),
}

/// Flat JSON shape the backend sends for each status entry
#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireStatus {
    id: String,
    #[serde(default)]
    name: Option<String>,
    status: WireRunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cpu_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<WireTime>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    restart_attempts: u32,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

fn default_true() -> bool {
    true
}

impl TryFrom<WireStatus> for ScriptStatus {
    type Error = String;

    fn try_from(wire: WireStatus) -> Result<Self, Self::Error> {
        let state = match wire.status {
            WireRunState::Stopped => ScriptState::Stopped,
            WireRunState::Running => {
                let pid = wire
                    .pid
                    .ok_or_else(|| format!("running script '{}' has no pid", wire.id))?;
                let start_time = wire
                    .start_time
                    .as_ref()
                    .and_then(parse_start_time)
                    .ok_or_else(|| format!("running script '{}' has no valid start_time", wire.id))?;
                ScriptState::Running(ProcessStats {
                    pid,
                    cpu_percent: wire.cpu_percent.unwrap_or(0.0).max(0.0),
                    memory_mb: wire.memory_mb.unwrap_or(0.0).max(0.0),
                    start_time,
                })
            }
        };

        let group = wire
            .group
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GROUP.to_string());

        Ok(ScriptStatus {
            name: wire.name.unwrap_or_else(|| wire.id.clone()),
            id: wire.id,
            group,
            enabled: wire.enabled,
            restart_attempts: wire.restart_attempts,
            path: wire.path,
            state,
        })
    }
}

impl From<ScriptStatus> for WireStatus {
    fn from(status: ScriptStatus) -> Self {
        let (run_state, pid, cpu, mem, start) = match status.state {
            ScriptState::Running(stats) => (
                WireRunState::Running,
                Some(stats.pid),
                Some(stats.cpu_percent),
                Some(stats.memory_mb),
                Some(WireTime::Text(stats.start_time.to_rfc3339())),
            ),
            ScriptState::Stopped => (WireRunState::Stopped, None, None, None, None),
        };
        WireStatus {
            id: status.id,
            name: Some(status.name),
            status: run_state,
            pid,
            cpu_percent: cpu,
            memory_mb: mem,
            start_time: start,
            group: Some(status.group),
            restart_attempts: status.restart_attempts,
            enabled: status.enabled,
            path: status.path,
        }
    }
}

/// The backend emits naive local ISO timestamps; RFC 3339 and epoch seconds
/// are accepted too.
fn parse_start_time(raw: &WireTime) -> Option<DateTime<Utc>> {
    match raw {
        WireTime::Epoch(secs) => {
            let millis = (*secs * 1000.0) as i64;
            DateTime::from_timestamp_millis(millis)
        }
        WireTime::Text(text) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Some(dt.with_timezone(&Utc));
            }
            let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()?;
            Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

/// Which channel produced a snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotSource {
    Push,
    Poll,
}

/// One complete, atomic listing of every tracked script
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub source: SnapshotSource,
    pub entries: Vec<ScriptStatus>,
}

impl StatusSnapshot {
    pub fn new(source: SnapshotSource, entries: Vec<ScriptStatus>) -> Self {
        Self { source, entries }
    }
}

/// Script arguments as stored by the backend: either a list or one string
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptArgs {
    List(Vec<String>),
    Line(String),
}

impl ScriptArgs {
    pub fn to_line(&self) -> String {
        match self {
            ScriptArgs::List(args) => args.join(" "),
            ScriptArgs::Line(line) => line.clone(),
        }
    }
}

impl Default for ScriptArgs {
    fn default() -> Self {
        ScriptArgs::List(Vec::new())
    }
}

/// Inventory entry as configured on the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub id: ScriptId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub args: ScriptArgs,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub max_memory_mb: Option<f64>,
}

impl ScriptConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Editable fields for `PUT /api/scripts/{id}/update`; unset fields are left alone
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_restart: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<f64>,
}

impl ScriptUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ScriptUpdate::default()
    }
}

/// Body for `POST /api/scripts/add`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewScript {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default = "default_true")]
    pub auto_restart: bool,
}

/// Lifecycle requests the client may issue for a single script
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

impl ControlAction {
    /// Path segment used by the backend route
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_running_entry_parses_stats() {
        let status: ScriptStatus = serde_json::from_value(json!({
            "id": "web",
            "name": "Web monitor",
            "status": "running",
            "pid": 4242,
            "cpu_percent": 12.5,
            "memory_mb": 48.0,
            "start_time": "2024-05-01T10:00:00+00:00",
            "group": "monitors",
            "enabled": true,
            "path": "/srv/web_monitor.py"
        }))
        .unwrap();

        assert!(status.is_running());
        assert_eq!(status.pid(), Some(4242));
        assert_eq!(status.cpu_percent(), Some(12.5));
        assert_eq!(status.group, "monitors");
        assert_eq!(
            status.start_time().unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[test]
    fn test_stopped_entry_drops_running_fields() {
        let status: ScriptStatus = serde_json::from_value(json!({
            "id": "job",
            "name": "job",
            "status": "stopped",
            "pid": 17,
            "cpu_percent": 3.0,
            "restart_attempts": 2,
            "enabled": false
        }))
        .unwrap();

        assert!(!status.is_running());
        assert_eq!(status.pid(), None);
        assert_eq!(status.memory_mb(), None);
        assert_eq!(status.restart_attempts, 2);
        assert_eq!(status.group, DEFAULT_GROUP);
    }

    #[test]
    fn test_running_without_pid_is_rejected() {
        let result: Result<ScriptStatus, _> = serde_json::from_value(json!({
            "id": "x",
            "status": "running",
            "start_time": "2024-05-01T10:00:00"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_figures_clamp_to_zero() {
        let status: ScriptStatus = serde_json::from_value(json!({
            "id": "x",
            "status": "running",
            "pid": 1,
            "cpu_percent": -1.0,
            "memory_mb": -5.0,
            "start_time": 1714557600.0
        }))
        .unwrap();
        assert_eq!(status.cpu_percent(), Some(0.0));
        assert_eq!(status.memory_mb(), Some(0.0));
    }

    #[test]
    fn test_serialize_stopped_omits_pid() {
        let status = ScriptStatus {
            id: "a".into(),
            name: "a".into(),
            group: DEFAULT_GROUP.into(),
            enabled: true,
            restart_attempts: 0,
            path: None,
            state: ScriptState::Stopped,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "stopped");
        assert!(value.get("pid").is_none());
    }

    #[test]
    fn test_script_args_accept_list_or_line() {
        let cfg: ScriptConfig =
            serde_json::from_value(json!({"id": "a", "args": ["--port", "80"]})).unwrap();
        assert_eq!(cfg.args.to_line(), "--port 80");
        let cfg: ScriptConfig =
            serde_json::from_value(json!({"id": "a", "args": "-v"})).unwrap();
        assert_eq!(cfg.args.to_line(), "-v");
        assert!(cfg.enabled);
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let update = ScriptUpdate {
            group: Some("etl".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"group": "etl"}));
        assert!(ScriptUpdate::default().is_empty());
    }
}
