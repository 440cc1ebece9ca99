use async_trait::async_trait;

use crate::api::HealthPayload;
use crate::error::ClientError;
use crate::log_view::LogTarget;
use crate::model::{ControlAction, NewScript, ScriptConfig, ScriptId, ScriptStatus, ScriptUpdate};
use crate::socketio::PushEvent;

/// Request/response side of the process-manager API.
///
/// Implementations never retry on their own; each call is one request and the
/// caller decides what a failure means for its state.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn health(&self) -> Result<HealthPayload, ClientError>;

    async fn fetch_inventory(&self) -> Result<Vec<ScriptConfig>, ClientError>;

    async fn fetch_status(&self) -> Result<Vec<ScriptStatus>, ClientError>;

    /// Most recent `lines` lines for a script or the manager itself
    async fn fetch_logs(&self, target: &LogTarget, lines: usize)
    -> Result<Vec<String>, ClientError>;

    async fn control(&self, id: &ScriptId, action: ControlAction) -> Result<(), ClientError>;

    async fn start_all(&self) -> Result<(), ClientError>;

    async fn stop_all(&self) -> Result<(), ClientError>;

    async fn add(&self, script: &NewScript) -> Result<(), ClientError>;

    async fn remove(&self, id: &ScriptId) -> Result<(), ClientError>;

    async fn update(&self, id: &ScriptId, update: &ScriptUpdate) -> Result<(), ClientError>;
}

/// Persistent server-initiated event connection
#[async_trait]
pub trait PushChannel: Send {
    /// Establish the connection, including any protocol handshake
    async fn connect(&mut self) -> Result<(), ClientError>;

    /// Next event from the server. `None` means the connection dropped.
    async fn next_event(&mut self) -> Option<Result<PushEvent, ClientError>>;

    /// Tear down the connection; calling it on a closed channel is a no-op
    async fn close(&mut self);
}
