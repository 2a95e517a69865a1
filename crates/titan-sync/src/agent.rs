//! # Replay Agent
//!
//! Background task that drains the write queue whenever the backend comes
//! back.
//!
//! ## Agent Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ReplayAgent Loop                                 │
//! │                                                                         │
//! │  spawn()                                                                │
//! │    │                                                                    │
//! │    ├── reachable now and queue restored non-empty? ──► drain once       │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  ┌───────────────────────── select! ──────────────────────────────┐    │
//! │  │                                                                │    │
//! │  │  monitor.watch() changed ──► reachable, queue non-empty        │    │
//! │  │                              ──► drain (flaps may coalesce)    │    │
//! │  │                              unreachable ──► nothing           │    │
//! │  │                                                                │    │
//! │  │  trigger_rx              ──► drain (manual "sync now")         │    │
//! │  │                                                                │    │
//! │  │  shutdown_rx             ──► exit                              │    │
//! │  └────────────────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! │  EVENTS (to the sync-history UI):                                      │
//! │  emit_progress(pending, replayed)      after every drain               │
//! │  emit_replay_error(action_id, message) when the queue head fails       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ResilientClient;

// =============================================================================
// Event Sink
// =============================================================================

/// Receives replay progress for display.
pub trait ReplayEventSink: Send + Sync {
    /// Emitted after each drain pass.
    fn emit_progress(&self, pending: usize, replayed: usize);

    /// Emitted when the head of the queue fails to replay.
    fn emit_replay_error(&self, action_id: Uuid, message: &str);
}

/// Discards every event.
pub struct NoOpSink;

impl ReplayEventSink for NoOpSink {
    fn emit_progress(&self, _pending: usize, _replayed: usize) {}
    fn emit_replay_error(&self, _action_id: Uuid, _message: &str) {}
}

// =============================================================================
// Agent
// =============================================================================

/// Spawns the replay loop.
pub struct ReplayAgent;

impl ReplayAgent {
    /// Starts draining on reconnect. The task runs until the handle is shut
    /// down.
    pub fn spawn(client: Arc<ResilientClient>, sink: Arc<dyn ReplayEventSink>) -> ReplayAgentHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let state_rx = client.monitor().watch();

        let task = tokio::spawn(run(client, sink, state_rx, trigger_rx, shutdown_rx));

        ReplayAgentHandle {
            shutdown_tx,
            trigger_tx,
            task,
        }
    }
}

async fn run(
    client: Arc<ResilientClient>,
    sink: Arc<dyn ReplayEventSink>,
    mut state_rx: watch::Receiver<bool>,
    mut trigger_rx: mpsc::Receiver<()>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let reachable = *state_rx.borrow_and_update();
    info!(reachable, "Replay agent started");

    if reachable && !client.queue().is_empty().await {
        drain(&client, sink.as_ref()).await;
    }

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    debug!("Connectivity monitor dropped, replay agent exiting");
                    break;
                }
                // A watch only keeps the latest value, so a false→true flap
                // seen while draining arrives as true→true.
                let now = *state_rx.borrow_and_update();
                if now && !client.queue().is_empty().await {
                    info!("Backend reachable, draining write queue");
                    drain(&client, sink.as_ref()).await;
                }
            }
            Some(()) = trigger_rx.recv() => {
                if client.monitor().current_state() {
                    drain(&client, sink.as_ref()).await;
                } else {
                    debug!("Manual drain ignored while unreachable");
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Replay agent received shutdown");
                break;
            }
        }
    }
}

async fn drain(client: &ResilientClient, sink: &dyn ReplayEventSink) {
    let report = client.drain_queue().await;

    if let Some(ref failure) = report.failed {
        warn!(
            action_id = %failure.action_id,
            error = %failure.message,
            remaining = report.remaining,
            "Write queue drain halted"
        );
        sink.emit_replay_error(failure.action_id, &failure.message);
    } else if !report.is_noop() {
        info!(replayed = report.replayed, "Write queue drained");
    }

    sink.emit_progress(report.remaining, report.replayed);
}

/// Control handle for a running agent.
pub struct ReplayAgentHandle {
    shutdown_tx: mpsc::Sender<()>,
    trigger_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReplayAgentHandle {
    /// Requests a drain now. Ignored while unreachable.
    pub async fn trigger_drain(&self) {
        let _ = self.trigger_tx.send(()).await;
    }

    /// Stops the agent and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::{ConnectivityMonitor, ReachabilityProbe};
    use crate::error::ApiResult;
    use crate::transport::{ApiRequest, LiveTransport};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use titan_db::MemoryKvStore;

    struct NeverProbe;

    #[async_trait]
    impl ReachabilityProbe for NeverProbe {
        async fn check(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<ApiRequest>>,
    }

    #[async_trait]
    impl LiveTransport for RecordingTransport {
        async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
            self.calls.lock().unwrap().push(request.clone());
            Ok(json!({"ok": true}))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        progress: Mutex<Vec<(usize, usize)>>,
    }

    impl ReplayEventSink for RecordingSink {
        fn emit_progress(&self, pending: usize, replayed: usize) {
            self.progress.lock().unwrap().push((pending, replayed));
        }

        fn emit_replay_error(&self, _action_id: Uuid, _message: &str) {}
    }

    async fn setup() -> (Arc<RecordingTransport>, Arc<ResilientClient>) {
        let transport = Arc::new(RecordingTransport::default());
        let monitor = Arc::new(ConnectivityMonitor::new(Arc::new(NeverProbe)));
        let store = Arc::new(MemoryKvStore::new());
        let client =
            ResilientClient::open(transport.clone(), monitor, store, Duration::from_secs(30)).await;
        (transport, Arc::new(client))
    }

    async fn wait_for_empty_queue(client: &ResilientClient) {
        for _ in 0..200 {
            if client.pending_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never drained");
    }

    #[tokio::test]
    async fn test_drains_on_reconnect() {
        let (transport, client) = setup().await;
        let sink = Arc::new(RecordingSink::default());
        let handle = ReplayAgent::spawn(client.clone(), sink.clone());

        client
            .send(ApiRequest::post("/things", json!({"name": "X"})))
            .await
            .unwrap();
        assert_eq!(client.pending_count().await, 1);

        client.monitor().observe(true);
        wait_for_empty_queue(&client).await;

        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body, Some(json!({"name": "X"})));

        handle.shutdown().await;
        assert!(sink.progress.lock().unwrap().contains(&(0, 1)));
    }

    #[tokio::test]
    async fn test_drains_restored_queue_on_start_when_reachable() {
        let (transport, client) = setup().await;
        client.send(ApiRequest::delete("/things/9")).await.unwrap();
        client.monitor().observe(true);

        let handle = ReplayAgent::spawn(client.clone(), Arc::new(NoOpSink));
        wait_for_empty_queue(&client).await;

        assert_eq!(transport.calls.lock().unwrap().len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_going_offline_does_not_drain() {
        let (transport, client) = setup().await;
        client.monitor().observe(true);
        let handle = ReplayAgent::spawn(client.clone(), Arc::new(NoOpSink));

        client.monitor().observe(false);
        client.send(ApiRequest::post("/things", json!({}))).await.unwrap();
        handle.trigger_drain().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(client.pending_count().await, 1);
        assert!(transport.calls.lock().unwrap().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_flap_between_polls_still_drains() {
        let (transport, client) = setup().await;
        client.monitor().observe(true);
        let handle = ReplayAgent::spawn(client.clone(), Arc::new(NoOpSink));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The agent does not run between these, so it only sees the last value.
        client.monitor().observe(false);
        client.send(ApiRequest::post("/things", json!({"name": "F"}))).await.unwrap();
        client.monitor().observe(true);

        wait_for_empty_queue(&client).await;
        let calls = transport.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body, Some(json!({"name": "F"})));
        handle.shutdown().await;
    }
}
