//! # titan-sync: Offline-Tolerant API Client for Titan POS
//!
//! Every backend read and write goes through [`ResilientClient`]. While the
//! backend is reachable it behaves like a plain HTTP client with a timeout;
//! while it is not, reads come from the last good response and writes wait
//! in an ordered queue until the connection returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Client Resilience Layer                           │
//! │                                                                         │
//! │  UI / feature code                                                     │
//! │       │ dispatch(ApiRequest)                                            │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     ResilientClient                              │  │
//! │  └──────┬─────────────────┬──────────────────┬──────────────────────┘  │
//! │         │                 │                  │                          │
//! │         ▼                 ▼                  ▼                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────┐                │
//! │  │ResponseCache │  │  WriteQueue  │  │ LiveTransport  │                │
//! │  │ api_cache:*  │  │ write_queue  │  │ reqwest + tmo  │                │
//! │  └──────┬───────┘  └──────┬───────┘  └────────────────┘                │
//! │         └────────┬────────┘                                             │
//! │                  ▼                                                      │
//! │         dyn KeyValueStore (titan-db)                                   │
//! │                                                                         │
//! │  ┌──────────────────────┐     false→true     ┌──────────────────────┐  │
//! │  │ ConnectivityMonitor  │ ─────────────────► │ ReplayAgent          │  │
//! │  │ probe + observe()    │                    │ drain_queue()        │  │
//! │  └──────────────────────┘                    └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - Background replay on reconnect
//! - [`cache`] - Last good response per read endpoint
//! - [`client`] - The dispatch funnel
//! - [`config`] - Client configuration (TOML + env)
//! - [`connectivity`] - Reachability monitor and process-wide accessor
//! - [`error`] - API error types
//! - [`outbox`] - Ordered, persisted write queue
//! - [`transport`] - Request model and HTTP transport
//!
//! ## Usage
//!
//! ```rust,ignore
//! use titan_sync::{ApiRequest, ClientConfig, NoOpSink, ReplayAgent, ResilientClient};
//!
//! let config = ClientConfig::load_or_default(None);
//! let client = Arc::new(ResilientClient::connect(&config).await?);
//! let agent = ReplayAgent::spawn(client.clone(), Arc::new(NoOpSink));
//!
//! let outcome = client.send(ApiRequest::post("/sales", body)).await?;
//! if outcome.is_queued() {
//!     // show "will sync when online"
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod outbox;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{NoOpSink, ReplayAgent, ReplayAgentHandle, ReplayEventSink};
pub use cache::{CacheEntry, ResponseCache};
pub use client::{DispatchOptions, DispatchOutcome, DispatchStatus, ResilientClient};
pub use config::ClientConfig;
pub use connectivity::{ConnectivityMonitor, HttpProbe, ReachabilityProbe, SubscriptionId};
pub use error::{ApiError, ApiResult};
pub use outbox::{DrainReport, QueuedAction, ReplayFailure, WriteQueue};
pub use transport::{ApiRequest, HttpMethod, HttpTransport, LiveTransport};
