//! # Resilient API Client
//!
//! The single funnel for backend reads and writes. Chooses between the
//! response cache, the write queue and a live call for every request.
//!
//! ## Dispatch Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         dispatch(request)                               │
//! │                                                                         │
//! │            reachable || force_replay ?                                 │
//! │               │                     │                                   │
//! │              no                    yes                                  │
//! │               │                     │                                   │
//! │      ┌────────┴────────┐           ▼                                    │
//! │      │                 │     live call under timeout                    │
//! │     GET            POST/PUT/…      │                                    │
//! │      │                 │     ┌─────┴─────────────┐                      │
//! │      ▼                 ▼     ok                 err                     │
//! │  cache hit? ──►    enqueue    │                  │                       │
//! │  Cached         → Queued     GET: write-through  GET + timeout/network: │
//! │  miss ──►                    to cache → Live     cache hit → Cached     │
//! │  OfflineNoCache              write → Live        otherwise: propagate   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Outcome Tagging
//! A queued write is acknowledged immediately so the UI is not blocked, but
//! the acknowledgement carries [`DispatchStatus::Queued`]. It never looks like
//! a server confirmation; callers that need one use
//! [`DispatchOutcome::into_confirmed`].
//!
//! Online write failures are never queued. Only writes attempted while the
//! device is unreachable end up in the queue.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use titan_db::{Database, DbConfig, KeyValueStore};

use crate::cache::ResponseCache;
use crate::config::ClientConfig;
use crate::connectivity::{ConnectivityMonitor, HttpProbe};
use crate::error::{ApiError, ApiResult};
use crate::outbox::{DrainReport, QueuedAction, WriteQueue};
use crate::transport::{ApiRequest, HttpTransport, LiveTransport};

/// Default timeout for one live call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Dispatch Types
// =============================================================================

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    /// Skip the reachability check and go live. Used by queue replay.
    pub force_replay: bool,
}

impl DispatchOptions {
    pub fn forced() -> Self {
        DispatchOptions { force_replay: true }
    }
}

/// Where a dispatch result came from.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchStatus {
    /// Answered by the backend.
    Live,
    /// Answered from the cache.
    Cached { stored_at: DateTime<Utc> },
    /// Accepted locally; replay pending.
    Queued { action_id: Uuid },
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    pub data: Value,
}

impl DispatchOutcome {
    pub fn is_live(&self) -> bool {
        matches!(self.status, DispatchStatus::Live)
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.status, DispatchStatus::Cached { .. })
    }

    pub fn is_queued(&self) -> bool {
        matches!(self.status, DispatchStatus::Queued { .. })
    }

    /// Payload only if it came from the backend or cache; a queued
    /// acknowledgement becomes [`ApiError::OfflineQueued`].
    pub fn into_confirmed(self) -> ApiResult<Value> {
        match self.status {
            DispatchStatus::Queued { action_id } => Err(ApiError::OfflineQueued { action_id }),
            _ => Ok(self.data),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Offline-tolerant backend client.
pub struct ResilientClient {
    transport: Arc<dyn LiveTransport>,
    monitor: Arc<ConnectivityMonitor>,
    cache: ResponseCache,
    queue: Arc<WriteQueue>,
    timeout: Duration,
}

impl ResilientClient {
    /// Assembles a client over the given store, restoring any queued writes.
    pub async fn open(
        transport: Arc<dyn LiveTransport>,
        monitor: Arc<ConnectivityMonitor>,
        store: Arc<dyn KeyValueStore>,
        timeout: Duration,
    ) -> Self {
        let cache = ResponseCache::new(store.clone());
        let queue = Arc::new(WriteQueue::open(store).await);

        ResilientClient {
            transport,
            monitor,
            cache,
            queue,
            timeout,
        }
    }

    /// Builds the production stack from configuration: SQLite storage, HTTP
    /// transport and an HTTP reachability probe seeded once.
    pub async fn connect(config: &ClientConfig) -> ApiResult<Self> {
        config.validate()?;

        let db_config = match config.storage_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| ApiError::Storage(e.to_string()))?;
                }
                DbConfig::new(path)
            }
            None => {
                warn!("No storage path available, cache and queue will not survive restart");
                DbConfig::in_memory()
            }
        };

        let db = Database::new(db_config).await?;
        let store: Arc<dyn KeyValueStore> = Arc::new(db.kv());

        let transport = Arc::new(HttpTransport::new(&config.api.base_url)?);
        let probe = Arc::new(HttpProbe::new(config.probe_url(), config.probe_timeout()));
        let monitor = Arc::new(ConnectivityMonitor::new(probe));
        monitor.initialize().await;

        info!(
            base_url = %config.api.base_url,
            reachable = monitor.current_state(),
            "Resilient client ready"
        );

        Ok(Self::open(transport, monitor, store, config.request_timeout()).await)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Sends a request with default options.
    pub async fn send(&self, request: ApiRequest) -> ApiResult<DispatchOutcome> {
        self.dispatch(request, DispatchOptions::default()).await
    }

    /// Routes a request to the cache, the queue or the backend.
    pub async fn dispatch(
        &self,
        request: ApiRequest,
        options: DispatchOptions,
    ) -> ApiResult<DispatchOutcome> {
        let reachable = options.force_replay || self.monitor.current_state();

        if !reachable {
            return self.dispatch_offline(&request).await;
        }

        match self.call_live(&request).await {
            Ok(data) => {
                if request.is_read() {
                    self.cache.put(&request.endpoint, &data).await;
                }
                Ok(DispatchOutcome {
                    status: DispatchStatus::Live,
                    data,
                })
            }
            Err(e) if request.is_read() && e.allows_cache_fallback() => {
                match self.cache.entry(&request.endpoint).await {
                    Some(entry) => {
                        warn!(
                            endpoint = %request.endpoint,
                            error = %e,
                            "Live read failed, serving cached response"
                        );
                        Ok(DispatchOutcome {
                            status: DispatchStatus::Cached {
                                stored_at: entry.stored_at,
                            },
                            data: entry.payload,
                        })
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn dispatch_offline(&self, request: &ApiRequest) -> ApiResult<DispatchOutcome> {
        if request.is_read() {
            return match self.cache.entry(&request.endpoint).await {
                Some(entry) => {
                    debug!(endpoint = %request.endpoint, "Offline read served from cache");
                    Ok(DispatchOutcome {
                        status: DispatchStatus::Cached {
                            stored_at: entry.stored_at,
                        },
                        data: entry.payload,
                    })
                }
                None => Err(ApiError::OfflineNoCache {
                    endpoint: request.endpoint.clone(),
                }),
            };
        }

        let action = self.queue.enqueue(request).await;
        Ok(DispatchOutcome {
            status: DispatchStatus::Queued {
                action_id: action.id,
            },
            data: json!({ "queued": true, "actionId": action.id }),
        })
    }

    async fn call_live(&self, request: &ApiRequest) -> ApiResult<Value> {
        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    method = %request.method,
                    endpoint = %request.endpoint,
                    timeout_secs = self.timeout.as_secs(),
                    "Live call timed out"
                );
                Err(ApiError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// Replays queued writes oldest first, stopping at the first failure.
    pub async fn drain_queue(&self) -> DrainReport {
        self.queue
            .drain(|action| {
                let request = action.to_request();
                async move {
                    self.dispatch(request, DispatchOptions::forced())
                        .await
                        .map(|_| ())
                }
            })
            .await
    }

    /// Pending writes, oldest first.
    pub async fn pending_actions(&self) -> Vec<QueuedAction> {
        self.queue.list().await
    }

    pub async fn pending_count(&self) -> usize {
        self.queue.len().await
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<WriteQueue> {
        &self.queue
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
