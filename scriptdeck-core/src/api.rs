//! Wire contract of the process-manager HTTP API
//!
//! Every response is wrapped in `{success, data?, error?}`. Routes are
//! described by [`Endpoint`] so the HTTP client and the tests agree on paths.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ClientError;
use crate::model::{ControlAction, ScriptConfig, ScriptId, ScriptStatus};

/// Sentinel target id for the manager's own log stream
pub const MANAGER_LOG_ID: &str = "manager";

/// Default number of log lines requested per fetch
pub const DEFAULT_LOG_LINES: usize = 100;

#[derive(Clone, Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Convert the envelope into a result, mapping `success: false` to an
    /// application error. `id` lets "Script not found" map to `NotFound`.
    pub fn into_result(self, id: Option<&str>) -> Result<Option<T>, ClientError> {
        if self.success {
            return Ok(self.data);
        }
        let message = self.error.unwrap_or_else(|| "request failed".to_string());
        if let Some(id) = id {
            if message.to_lowercase().contains("not found") {
                return Err(ClientError::NotFound { id: id.to_string() });
            }
        }
        Err(ClientError::Application { message })
    }
}

/// Decode an envelope from raw JSON and require a `data` payload
pub fn decode_data<T: DeserializeOwned>(body: &str, id: Option<&str>) -> Result<T, ClientError> {
    let envelope: ApiResponse<T> =
        serde_json::from_str(body).map_err(|e| ClientError::decode(e.to_string()))?;
    envelope
        .into_result(id)?
        .ok_or_else(|| ClientError::decode("response has no data"))
}

/// Decode an envelope whose payload we do not care about
pub fn decode_ack(body: &str, id: Option<&str>) -> Result<(), ClientError> {
    let envelope: ApiResponse<serde_json::Value> =
        serde_json::from_str(body).map_err(|e| ClientError::decode(e.to_string()))?;
    envelope.into_result(id).map(|_| ())
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StatusPayload {
    #[serde(deserialize_with = "usable_entries")]
    pub status: Vec<ScriptStatus>,
}

/// Decode entries one by one; a malformed entry is skipped, not the snapshot
fn usable_entries<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<ScriptStatus>, D::Error> {
    let raw = Vec::<Value>::deserialize(de)?;
    Ok(raw
        .into_iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(Value::as_str).unwrap_or("?").to_string();
            serde_json::from_value::<ScriptStatus>(entry)
                .map_err(|e| warn!(script_id = %id, error = %e, "skipping malformed status entry"))
                .ok()
        })
        .collect())
}

#[derive(Clone, Debug, Deserialize)]
pub struct InventoryPayload {
    pub scripts: Vec<ScriptConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogsPayload {
    pub logs: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HealthPayload {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// Every route the client calls
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    Inventory,
    Status,
    Control { id: ScriptId, action: ControlAction },
    StartAll,
    StopAll,
    Add,
    Remove { id: ScriptId },
    Update { id: ScriptId },
    ScriptLogs { id: ScriptId, lines: usize },
    ManagerLogs { path: String, lines: usize },
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::Health
            | Endpoint::Inventory
            | Endpoint::Status
            | Endpoint::ScriptLogs { .. }
            | Endpoint::ManagerLogs { .. } => Method::Get,
            Endpoint::Control { .. } | Endpoint::StartAll | Endpoint::StopAll | Endpoint::Add => {
                Method::Post
            }
            Endpoint::Update { .. } => Method::Put,
            Endpoint::Remove { .. } => Method::Delete,
        }
    }

    /// Unencoded path segments; a script id is always exactly one segment
    pub fn segments(&self) -> Vec<String> {
        fn fixed(parts: &[&str]) -> Vec<String> {
            parts.iter().map(|p| p.to_string()).collect()
        }
        fn scripts(id: &str, tail: &str) -> Vec<String> {
            vec!["api".into(), "scripts".into(), id.to_string(), tail.to_string()]
        }
        match self {
            Endpoint::Health => fixed(&["api", "health"]),
            Endpoint::Inventory => fixed(&["api", "scripts"]),
            Endpoint::Status => fixed(&["api", "scripts", "status"]),
            Endpoint::Control { id, action } => scripts(id, action.as_str()),
            Endpoint::StartAll => fixed(&["api", "scripts", "start-all"]),
            Endpoint::StopAll => fixed(&["api", "scripts", "stop-all"]),
            Endpoint::Add => fixed(&["api", "scripts", "add"]),
            Endpoint::Remove { id } => scripts(id, "remove"),
            Endpoint::Update { id } => scripts(id, "update"),
            Endpoint::ScriptLogs { id, .. } => scripts(id, "logs"),
            Endpoint::ManagerLogs { path, .. } => path
                .split('/')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn query(&self) -> Option<String> {
        match self {
            Endpoint::ScriptLogs { lines, .. } | Endpoint::ManagerLogs { lines, .. } => {
                Some(format!("lines={}", lines))
            }
            _ => None,
        }
    }

    /// Path and query, relative to the backend origin, for display
    pub fn path(&self) -> String {
        let path = format!("/{}", self.segments().join("/"));
        match self.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        }
    }

    /// Script the request is about, used to classify "not found" failures
    pub fn script_id(&self) -> Option<&str> {
        match self {
            Endpoint::Control { id, .. }
            | Endpoint::Remove { id }
            | Endpoint::Update { id }
            | Endpoint::ScriptLogs { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status_payload() {
        let body = r#"{"success": true, "timestamp": "x", "data": {"status": [
            {"id": "a", "name": "A", "status": "stopped", "enabled": true}
        ]}}"#;
        let payload: StatusPayload = decode_data(body, None).unwrap();
        assert_eq!(payload.status.len(), 1);
        assert_eq!(payload.status[0].name, "A");
    }

    #[test]
    fn test_malformed_entry_does_not_reject_snapshot() {
        let body = r#"{"success": true, "data": {"status": [
            {"id": "good", "status": "stopped"},
            {"id": "bad", "status": "running", "cpu_percent": 3.0},
            {"id": "up", "status": "running", "pid": 42, "start_time": "2024-05-01T10:00:00Z"},
            "not an object"
        ]}}"#;
        let payload: StatusPayload = decode_data(body, None).unwrap();
        let ids: Vec<&str> = payload.status.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "up"]);
        assert!(payload.status[1].is_running());
    }

    #[test]
    fn test_failure_envelope_is_application_error() {
        let body = r#"{"success": false, "error": "Script is already running"}"#;
        let err = decode_ack(body, Some("a")).unwrap_err();
        assert_eq!(err, ClientError::application("Script is already running"));
    }

    #[test]
    fn test_not_found_message_maps_to_not_found() {
        let body = r#"{"success": false, "error": "Script not found"}"#;
        let err = decode_ack(body, Some("gone")).unwrap_err();
        assert_eq!(err, ClientError::NotFound { id: "gone".into() });
    }

    #[test]
    fn test_garbage_body_is_decode_error() {
        let err = decode_ack("<html>502</html>", None).unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[test]
    fn test_endpoint_paths() {
        let ep = Endpoint::Control {
            id: "etl".into(),
            action: ControlAction::Restart,
        };
        assert_eq!(ep.method(), Method::Post);
        assert_eq!(ep.path(), "/api/scripts/etl/restart");
        assert_eq!(
            Endpoint::ScriptLogs { id: "etl".into(), lines: 50 }.path(),
            "/api/scripts/etl/logs?lines=50"
        );
        assert_eq!(
            Endpoint::ManagerLogs { path: "/api/manager/logs".into(), lines: 100 }.path(),
            "/api/manager/logs?lines=100"
        );
        assert_eq!(Endpoint::Health.path(), "/api/health");
        assert_eq!(Endpoint::Remove { id: "a".into() }.method(), Method::Delete);
        assert_eq!(Endpoint::Update { id: "a".into() }.method(), Method::Put);
    }

    #[test]
    fn test_script_id_is_one_segment() {
        let ep = Endpoint::Update { id: "jobs/nightly?v=2".into() };
        assert_eq!(ep.segments(), vec!["api", "scripts", "jobs/nightly?v=2", "update"]);
        assert!(ep.query().is_none());
        let logs = Endpoint::ScriptLogs { id: "a b".into(), lines: 5 };
        assert_eq!(logs.segments()[2], "a b");
        assert_eq!(logs.query().as_deref(), Some("lines=5"));
    }
}
