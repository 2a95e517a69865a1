//! # titan-print: Receipt Printing Pipeline for Titan POS
//!
//! Gets a finalized receipt onto paper through an unreliable short-range
//! wireless link, and tells the cashier honestly when it did not.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Print Pipeline                                 │
//! │                                                                         │
//! │  checkout ──► PrintOrchestrator ── format (titan-core) ──► lines        │
//! │                    │  Idle → Printing → Succeeded | Failed             │
//! │                    │                                                    │
//! │                    ▼ dyn BridgeClient                                   │
//! │        HttpBridgeClient ─── HTTP ───► bridge::router (axum)            │
//! │                                          │ per-device lock              │
//! │                                          ▼                              │
//! │                                   DriverChain                           │
//! │                                   ├─ RfcommDriver  (line streaming)     │
//! │                                   └─ SppDriver     (buffered write)     │
//! │                                          │ both failed                  │
//! │                                          ▼                              │
//! │                                   FileFallback (optional)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`bridge`] - HTTP service, per-device serialization, server handle
//! - [`client`] - Bridge client trait and reqwest implementation
//! - [`config`] - Print configuration (TOML + env)
//! - [`driver`] - Driver trait, attempt outcomes, fallback chain
//! - [`error`] - Print error types
//! - [`escpos`] - ESC/POS byte sequences
//! - [`fallback`] - Save-to-file when no driver prints
//! - [`link`] - Byte links to the printer (bound RFCOMM device nodes)
//! - [`orchestrator`] - Client-side print state machine
//! - [`rfcomm`] - Primary driver
//! - [`spp`] - Secondary driver with channel discovery

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bridge;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod escpos;
pub mod fallback;
pub mod link;
pub mod orchestrator;
pub mod rfcomm;
pub mod spp;

// =============================================================================
// Re-exports
// =============================================================================

pub use bridge::{router, BridgeHandle, BridgeServer, BridgeState};
pub use client::{BridgeClient, HttpBridgeClient};
pub use config::PrintConfig;
pub use driver::{AttemptOutcome, DeliveryReport, DriverAttempt, DriverChain, PrintDriver};
pub use error::{PrintError, PrintResult};
pub use fallback::FileFallback;
pub use link::{LinkConnector, NodeBinder, PrintLink, RfcommConnector, RfcommTool};
pub use orchestrator::{AutoPrint, PrintJob, PrintOrchestrator, PrintState};
pub use rfcomm::RfcommDriver;
pub use spp::{ChannelResolver, SdpToolResolver, SppDriver};
