//! Owns a live session: transports feed it, effects are carried out here

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use scriptdeck_core::backend::Backend;
use scriptdeck_core::config::ClientConfig;
use scriptdeck_core::error::ClientError;
use scriptdeck_core::model::{
    ControlAction, NewScript, ScriptId, ScriptUpdate, SnapshotSource, StatusSnapshot,
};
use scriptdeck_core::reducer::{Action, Effect, EventEnvelope, Session, SessionEvent, reduce};
use scriptdeck_core::transport::{EventSink, Multiplexer, Repeater, start_log_follower};

use crate::push::WsPushChannel;

/// A user request with everything needed to send it
#[derive(Clone, Debug)]
pub enum Request {
    Control { id: ScriptId, action: ControlAction },
    StartAll,
    StopAll,
    Add(NewScript),
    Remove(ScriptId),
    Update(ScriptId, ScriptUpdate),
}

impl Request {
    pub fn action(&self) -> Action {
        match self {
            Self::Control { id, action } => Action::Control {
                id: id.clone(),
                action: *action,
            },
            Self::StartAll => Action::StartAll,
            Self::StopAll => Action::StopAll,
            Self::Add(script) => Action::Add {
                path: script.path.clone(),
            },
            Self::Remove(id) => Action::Remove { id: id.clone() },
            Self::Update(id, _) => Action::Update { id: id.clone() },
        }
    }

    pub async fn send(&self, backend: &dyn Backend) -> Result<(), ClientError> {
        match self {
            Self::Control { id, action } => backend.control(id, *action).await,
            Self::StartAll => backend.start_all().await,
            Self::StopAll => backend.stop_all().await,
            Self::Add(script) => backend.add(script).await,
            Self::Remove(id) => backend.remove(id).await,
            Self::Update(id, update) => backend.update(id, update).await,
        }
    }
}

pub struct Runtime {
    pub session: Session,
    config: ClientConfig,
    backend: Arc<dyn Backend>,
    sink: EventSink,
    rx: mpsc::UnboundedReceiver<EventEnvelope>,
    follower: Repeater,
    mux: Multiplexer,
}

impl Runtime {
    /// Start polling, the push channel (when enabled), and an inventory fetch
    pub fn start(config: ClientConfig, backend: Arc<dyn Backend>) -> Self {
        let (sink, rx) = EventSink::channel();
        let push = if config.push.enabled {
            match WsPushChannel::new(&config) {
                Ok(channel) => Some(channel),
                Err(err) => {
                    warn!(error = %err, "push channel not configured");
                    None
                }
            }
        } else {
            None
        };
        let mux = Multiplexer::start(backend.clone(), push, &config, sink.clone());

        let mut runtime = Self {
            session: Session::new(),
            config,
            backend,
            sink,
            rx,
            follower: Repeater::new(),
            mux,
        };
        runtime.execute(Effect::FetchInventory);
        runtime
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queue a local event (selection, visibility) behind pending ones
    pub fn emit(&self, event: SessionEvent) {
        self.sink.emit(event);
    }

    pub fn request(&self, request: Request) {
        let backend = self.backend.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let result = request.send(backend.as_ref()).await;
            sink.emit(SessionEvent::ActionCompleted {
                action: request.action(),
                result,
            });
        });
    }

    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }

    pub fn handle(&mut self, env: EventEnvelope) {
        for effect in reduce(&mut self.session, &env) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::FetchStatus => {
                let backend = self.backend.clone();
                let sink = self.sink.clone();
                tokio::spawn(async move {
                    let event = match backend.fetch_status().await {
                        Ok(entries) => SessionEvent::Snapshot(StatusSnapshot::new(
                            SnapshotSource::Poll,
                            entries,
                        )),
                        Err(err) => SessionEvent::PollFailed(err),
                    };
                    sink.emit(event);
                });
            }
            Effect::FetchInventory => {
                let backend = self.backend.clone();
                let sink = self.sink.clone();
                tokio::spawn(async move {
                    let result = backend.fetch_inventory().await;
                    sink.emit(SessionEvent::InventoryFetched(result));
                });
            }
            Effect::FetchLogs(target) => {
                let backend = self.backend.clone();
                let sink = self.sink.clone();
                let lines = self.config.log_lines;
                tokio::spawn(async move {
                    let result = backend.fetch_logs(&target, lines).await;
                    sink.emit(SessionEvent::LogsFetched { target, result });
                });
            }
            Effect::StartFollow(target) => start_log_follower(
                &mut self.follower,
                self.backend.clone(),
                target,
                self.config.log_lines,
                self.config.log_refresh(),
                self.sink.clone(),
            ),
            Effect::StopFollow => self.follower.stop(),
        }
    }

    pub fn shutdown(&mut self) {
        self.follower.stop();
        self.mux.shutdown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
