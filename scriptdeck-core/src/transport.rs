//! Transport multiplexer
//!
//! Runs the status poller and the push channel side by side and funnels both
//! into one stream of [`EventEnvelope`]s. Polling never stops for the whole
//! session; push reconnects a bounded number of times and then gives up for
//! good.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::{Backend, PushChannel};
use crate::config::{ClientConfig, PushConfig};
use crate::log_view::LogTarget;
use crate::model::{SnapshotSource, StatusSnapshot};
use crate::reducer::{EventEnvelope, SessionEvent};
use crate::socketio::PushEvent;

/// Numbered, timestamped sender into the session loop
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EventEnvelope>,
    next_id: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Returns false once the session loop is gone
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(EventEnvelope {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
                at: Instant::now(),
                event,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A cancellable repeating task. Stopping a stopped repeater is a no-op.
#[derive(Debug, Default)]
pub struct Repeater {
    handle: Option<JoinHandle<()>>,
}

impl Repeater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` every `period`, replacing whatever was running.
    /// With `immediate`, the first run happens right away.
    pub fn start<F, Fut>(&mut self, period: Duration, immediate: bool, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        let first = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task().await;
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Repeater {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the status poller. Every tick is an independent request so a stalled
/// one never delays the next.
pub fn start_poller(
    repeater: &mut Repeater,
    backend: Arc<dyn Backend>,
    period: Duration,
    sink: EventSink,
) {
    repeater.start(period, true, move || {
        let backend = backend.clone();
        let sink = sink.clone();
        async move {
            tokio::spawn(async move {
                let event = match backend.fetch_status().await {
                    Ok(entries) => {
                        SessionEvent::Snapshot(StatusSnapshot::new(SnapshotSource::Poll, entries))
                    }
                    Err(err) => SessionEvent::PollFailed(err),
                };
                sink.emit(event);
            });
        }
    });
}

/// Start repeating tail fetches for a log target
pub fn start_log_follower(
    repeater: &mut Repeater,
    backend: Arc<dyn Backend>,
    target: LogTarget,
    lines: usize,
    period: Duration,
    sink: EventSink,
) {
    debug!(target_id = %target.id(), "following log");
    repeater.start(period, false, move || {
        let backend = backend.clone();
        let sink = sink.clone();
        let target = target.clone();
        async move {
            let result = backend.fetch_logs(&target, lines).await;
            sink.emit(SessionEvent::LogTail { target, result });
        }
    });
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max { max } else { next }
}

/// Keep the push channel up until the reconnect budget runs out.
///
/// Consecutive failed connects are counted; a successful connect resets the
/// count. Once more than `max_reconnect_attempts` connects fail in a row the
/// session is told push is unavailable and the loop ends.
pub async fn push_loop<P: PushChannel>(mut channel: P, config: PushConfig, sink: EventSink) {
    let mut failures = 0u32;
    let mut backoff = config.initial_backoff();

    loop {
        if sink.is_closed() {
            channel.close().await;
            return;
        }

        if let Err(err) = channel.connect().await {
            failures += 1;
            warn!(error = %err, attempt = failures, "push connect failed");
            if failures > config.max_reconnect_attempts {
                sink.emit(SessionEvent::PushUnavailable {
                    reason: format!("gave up after {} attempts: {}", failures, err),
                });
                return;
            }
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff, config.max_backoff());
            continue;
        }

        failures = 0;
        backoff = config.initial_backoff();
        if !sink.emit(SessionEvent::PushConnected) {
            channel.close().await;
            return;
        }

        while let Some(next) = channel.next_event().await {
            let event = match next {
                Ok(PushEvent::StatusUpdate(entries)) => {
                    SessionEvent::Snapshot(StatusSnapshot::new(SnapshotSource::Push, entries))
                }
                Ok(PushEvent::LogUpdate { script_id, message }) => {
                    SessionEvent::PushLine { script_id, message }
                }
                Ok(PushEvent::Disconnected) => break,
                Ok(PushEvent::Connected) => continue,
                Ok(PushEvent::Other { name }) => {
                    debug!(event = %name, "ignoring push event");
                    continue;
                }
                Err(err) => {
                    debug!(error = %err, "dropping malformed push frame");
                    continue;
                }
            };
            if !sink.emit(event) {
                channel.close().await;
                return;
            }
        }

        channel.close().await;
        sink.emit(SessionEvent::PushDisconnected);
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff, config.max_backoff());
    }
}

/// Owns the session's background transports
#[derive(Debug, Default)]
pub struct Multiplexer {
    poller: Repeater,
    push: Option<JoinHandle<()>>,
}

impl Multiplexer {
    /// Start polling and, when given a channel, the push loop
    pub fn start<P>(
        backend: Arc<dyn Backend>,
        push: Option<P>,
        config: &ClientConfig,
        sink: EventSink,
    ) -> Self
    where
        P: PushChannel + 'static,
    {
        let mut poller = Repeater::new();
        start_poller(&mut poller, backend, config.poll_interval(), sink.clone());

        let push = match push {
            Some(channel) if config.push.enabled => {
                Some(tokio::spawn(push_loop(channel, config.push.clone(), sink)))
            }
            _ => {
                info!("push channel disabled, polling only");
                sink.emit(SessionEvent::PushUnavailable {
                    reason: "push disabled".into(),
                });
                None
            }
        };

        Self { poller, push }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn shutdown(&mut self) {
        self.poller.stop();
        if let Some(handle) = self.push.take() {
            handle.abort();
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
