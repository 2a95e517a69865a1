//! # Write Queue (Outbox)
//!
//! Writes made while the backend is unreachable, kept in submission order
//! until they replay successfully.
//!
//! ## Queue Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Write Queue Flow                                │
//! │                                                                         │
//! │  enqueue(POST /things)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  in-memory Vec<QueuedAction>  ──mirror──►  kv["write_queue"]     │  │
//! │  │                                                                  │  │
//! │  │  [0] a1  POST  /things     attempts 0                            │  │
//! │  │  [1] a2  PATCH /things/4   attempts 0                            │  │
//! │  │  [2] a3  DELETE /things/9  attempts 0                            │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ drain(replay)                          │
//! │                               ▼                                         │
//! │  head a1 ── replay ok ──► remove a1, mirror                             │
//! │  head a2 ── replay err ─► attempts += 1, lastError, mirror, STOP        │
//! │                           (a2 and a3 stay queued, in order)             │
//! │                                                                         │
//! │  Only one drain runs at a time; a second trigger waits, then finds      │
//! │  whatever the first one left.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Head-of-Line Policy
//! A failed head halts the drain. Later writes often depend on earlier ones
//! (create then update), so replaying past a failure could apply them to
//! state the server never saw.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use titan_db::{get_json, set_json, KeyValueStore};

use crate::error::ApiError;
use crate::transport::{ApiRequest, HttpMethod};

/// Storage key of the mirrored queue.
pub const QUEUE_KEY: &str = "write_queue";

// =============================================================================
// Queued Action
// =============================================================================

/// A write waiting for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub id: Uuid,
    pub endpoint: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedAction {
    fn from_request(request: &ApiRequest) -> Self {
        QueuedAction {
            id: Uuid::new_v4(),
            endpoint: request.endpoint.clone(),
            method: request.method,
            body: request.body.clone(),
            headers: request.headers.clone(),
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    /// The original request, verbatim.
    pub fn to_request(&self) -> ApiRequest {
        ApiRequest {
            endpoint: self.endpoint.clone(),
            method: self.method,
            body: self.body.clone(),
            headers: self.headers.clone(),
        }
    }
}

// =============================================================================
// Drain Report
// =============================================================================

/// The action that stopped a drain.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFailure {
    pub action_id: Uuid,
    pub message: String,
}

/// Result of one drain pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Actions replayed and removed.
    pub replayed: usize,
    /// Head action that failed, if any.
    pub failed: Option<ReplayFailure>,
    /// Actions still queued afterwards.
    pub remaining: usize,
}

impl DrainReport {
    /// True when the pass did nothing at all.
    pub fn is_noop(&self) -> bool {
        self.replayed == 0 && self.failed.is_none()
    }
}

// =============================================================================
// Write Queue
// =============================================================================

/// Ordered, persisted queue of pending writes.
pub struct WriteQueue {
    store: Arc<dyn KeyValueStore>,
    entries: Mutex<Vec<QueuedAction>>,
    drain_lock: Mutex<()>,
}

impl WriteQueue {
    /// Opens the queue, restoring whatever was persisted.
    ///
    /// A storage failure here starts an empty queue rather than failing the
    /// client; the failure is logged.
    pub async fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let restored = match get_json::<Vec<QueuedAction>>(store.as_ref(), QUEUE_KEY).await {
            Ok(Some(list)) => dedupe(list),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to restore write queue, starting empty");
                Vec::new()
            }
        };

        if !restored.is_empty() {
            info!(pending = restored.len(), "Restored write queue");
        }

        WriteQueue {
            store,
            entries: Mutex::new(restored),
            drain_lock: Mutex::new(()),
        }
    }

    /// Appends a write and returns the queued record.
    ///
    /// Never fails: a mirror failure leaves the action queued in memory for
    /// this process.
    pub async fn enqueue(&self, request: &ApiRequest) -> QueuedAction {
        let action = QueuedAction::from_request(request);

        let mut entries = self.entries.lock().await;
        entries.push(action.clone());
        self.mirror(&entries).await;

        info!(
            action_id = %action.id,
            method = %action.method,
            endpoint = %action.endpoint,
            pending = entries.len(),
            "Queued write for replay"
        );

        action
    }

    /// Snapshot of the queue, oldest first.
    pub async fn list(&self) -> Vec<QueuedAction> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Replays queued actions oldest first until the queue is empty or one
    /// fails.
    ///
    /// `replay` receives each action in turn; the action is removed only
    /// after it returns `Ok`.
    pub async fn drain<F, Fut>(&self, mut replay: F) -> DrainReport
    where
        F: FnMut(QueuedAction) -> Fut,
        Fut: Future<Output = Result<(), ApiError>>,
    {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        loop {
            // Lock released while replaying so enqueue stays responsive
            let head = self.entries.lock().await.first().cloned();
            let Some(action) = head else {
                break;
            };

            debug!(action_id = %action.id, endpoint = %action.endpoint, "Replaying queued write");

            match replay(action.clone()).await {
                Ok(()) => {
                    let mut entries = self.entries.lock().await;
                    entries.retain(|a| a.id != action.id);
                    self.mirror(&entries).await;
                    report.replayed += 1;
                    info!(action_id = %action.id, pending = entries.len(), "Replayed queued write");
                }
                Err(e) => {
                    let message = e.to_string();
                    let mut entries = self.entries.lock().await;
                    if let Some(entry) = entries.iter_mut().find(|a| a.id == action.id) {
                        entry.attempts += 1;
                        entry.last_error = Some(message.clone());
                    }
                    self.mirror(&entries).await;

                    warn!(
                        action_id = %action.id,
                        error = %message,
                        pending = entries.len(),
                        "Replay failed, halting drain"
                    );

                    report.failed = Some(ReplayFailure {
                        action_id: action.id,
                        message,
                    });
                    break;
                }
            }
        }

        report.remaining = self.entries.lock().await.len();
        report
    }

    async fn mirror(&self, entries: &[QueuedAction]) {
        if let Err(e) = set_json(self.store.as_ref(), QUEUE_KEY, entries).await {
            warn!(error = %e, pending = entries.len(), "Failed to persist write queue");
        }
    }
}

fn dedupe(list: Vec<QueuedAction>) -> Vec<QueuedAction> {
    let mut seen = HashSet::new();
    list.into_iter()
        .filter(|action| {
            let fresh = seen.insert(action.id);
            if !fresh {
                warn!(action_id = %action.id, "Dropping duplicate queued action");
            }
            fresh
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
