//! # Connectivity Monitor
//!
//! Tracks whether the backend is reachable and tells interested parties when
//! that changes.
//!
//! ## State Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity Monitor                                │
//! │                                                                         │
//! │  initialize() ──► probe once ──► observe(result)                       │
//! │                                                                         │
//! │  platform notification ─┐                                              │
//! │  passive probe loop ────┼──► observe(reachable)                         │
//! │                         │         │                                     │
//! │                         │         ▼                                     │
//! │                         │   same as current? ── yes ──► nothing         │
//! │                         │         │ no                                  │
//! │                         │         ▼                                     │
//! │                         │   update state                               │
//! │                         │   ├── watch::Receiver<bool> wakes            │
//! │                         │   └── subscribe() callbacks fire once        │
//! │                                                                         │
//! │  current_state() is a synchronous read of the last observed value.     │
//! │  The monitor never retries anything; it only observes.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callbacks are edge-triggered: ten consecutive "reachable" observations
//! produce at most one callback, so reconnect handlers do not pile up.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

// =============================================================================
// Reachability Probe
// =============================================================================

/// One-shot reachability check.
///
/// Implementations must not return errors: any failure means unreachable.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// Probes by issuing a GET. Any HTTP response, including an error status,
/// counts as reachable; only a transport failure or timeout does not.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        HttpProbe {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn check(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.client.get(&self.url).send()).await {
            Ok(Ok(response)) => {
                debug!(url = %self.url, status = %response.status(), "Probe answered");
                true
            }
            Ok(Err(e)) => {
                debug!(url = %self.url, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(url = %self.url, "Probe timed out");
                false
            }
        }
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Identifier returned by [`ConnectivityMonitor::subscribe`].
pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

/// Observes reachability and broadcasts transitions.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    state: watch::Sender<bool>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("reachable", &self.current_state())
            .finish()
    }
}

impl ConnectivityMonitor {
    /// Creates a monitor that starts out unreachable until the first
    /// observation.
    pub fn new(probe: Arc<dyn ReachabilityProbe>) -> Self {
        let (state, _) = watch::channel(false);
        ConnectivityMonitor {
            probe,
            state,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seeds the state with one probe. Returns the probed value.
    pub async fn initialize(&self) -> bool {
        self.probe_now().await
    }

    /// Runs the probe once and records the result.
    pub async fn probe_now(&self) -> bool {
        let reachable = self.probe.check().await;
        self.observe(reachable);
        reachable
    }

    /// Last observed reachability. Never blocks.
    pub fn current_state(&self) -> bool {
        *self.state.borrow()
    }

    /// Records an observation. Returns true when it was a transition.
    pub fn observe(&self, reachable: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });

        if changed {
            info!(reachable, "Connectivity changed");

            // Snapshot so a callback may subscribe/unsubscribe without deadlock
            let callbacks: Vec<Callback> = self
                .lock_subscribers()
                .iter()
                .map(|(_, cb)| cb.clone())
                .collect();

            for cb in callbacks {
                cb(reachable);
            }
        }

        changed
    }

    /// Registers a transition callback.
    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock_subscribers().push((id, Arc::new(callback)));
        id
    }

    /// Removes a callback. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock_subscribers();
        let before = subs.len();
        subs.retain(|(sub_id, _)| *sub_id != id);
        subs.len() != before
    }

    /// Receiver for async consumers; wakes on every transition.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Spawns a loop that probes every `interval` and feeds `observe`.
    pub fn spawn_passive_probe(self: &Arc<Self>, interval: Duration) -> PassiveProbeHandle {
        let monitor = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.probe_now().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Passive probe stopped");
                        break;
                    }
                }
            }
        });

        PassiveProbeHandle { shutdown_tx, task }
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Callback)>> {
        // A panicking callback must not disable connectivity tracking
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Stops a passive probe loop.
pub struct PassiveProbeHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl PassiveProbeHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// Process-Wide Accessor
// =============================================================================

static GLOBAL: RwLock<Option<Arc<ConnectivityMonitor>>> = RwLock::new(None);

/// Installs the process-wide monitor, returning the one it replaced.
pub fn install(monitor: Arc<ConnectivityMonitor>) -> Option<Arc<ConnectivityMonitor>> {
    let mut slot = GLOBAL.write().unwrap_or_else(|p| p.into_inner());
    slot.replace(monitor)
}

/// The installed monitor, if any.
pub fn global() -> Option<Arc<ConnectivityMonitor>> {
    GLOBAL.read().unwrap_or_else(|p| p.into_inner()).clone()
}

/// Removes the installed monitor.
pub fn teardown() -> Option<Arc<ConnectivityMonitor>> {
    GLOBAL.write().unwrap_or_else(|p| p.into_inner()).take()
}

// =============================================================================
// Unit Tests
// =============================================================================
