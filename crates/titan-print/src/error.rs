//! # Print Error Types
//!
//! Error types for the printing pipeline, shared by the bridge service and
//! the client-side orchestrator.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Print Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Delivery      │  │    Bridge       │  │     Link                │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  TransportUnav. │  │  BridgeUnreach. │  │  LinkUnavailable        │ │
//! │  │  TransportFailed│  │  BridgeRejected │  │  Link                   │ │
//! │  │  FileFallback   │  │  Timeout        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Request       │  │  Configuration  │                              │
//! │  │                 │  │                 │                              │
//! │  │  InvalidRequest │  │  InvalidConfig  │                              │
//! │  │  Receipt        │  │  ConfigLoad/Save│                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `FileFallback` means the receipt was saved to disk instead of printed.
//! It is a failure as far as printing is concerned.

use std::path::PathBuf;
use thiserror::Error;

use crate::driver::DriverAttempt;

/// Result type alias for print operations.
pub type PrintResult<T> = Result<T, PrintError>;

#[derive(Debug, Error)]
pub enum PrintError {
    // =========================================================================
    // Delivery
    // =========================================================================
    /// No driver could even be constructed for the device.
    #[error("No print transport available: {0}")]
    TransportUnavailable(String),

    /// Every driver was tried and none delivered.
    #[error("All print transports failed: {}", summarize(.attempts))]
    TransportFailed { attempts: Vec<DriverAttempt> },

    /// Printing failed; the receipt was written to a file instead.
    #[error("Printer unavailable, receipt saved to {}: {reason}", .path.display())]
    FileFallback { path: PathBuf, reason: String },

    /// The print did not finish within its budget.
    #[error("Print timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Link
    // =========================================================================
    /// The device node or socket does not exist.
    #[error("Printer link unavailable: {0}")]
    LinkUnavailable(String),

    /// I/O error on an open link.
    #[error("Printer link error: {0}")]
    Link(String),

    // =========================================================================
    // Bridge (client side)
    // =========================================================================
    #[error("Print bridge unreachable: {0}")]
    BridgeUnreachable(String),

    #[error("Print bridge rejected request ({status}): {message}")]
    BridgeRejected { status: u16, message: String },

    // =========================================================================
    // Request
    // =========================================================================
    #[error("Invalid print request: {0}")]
    InvalidRequest(String),

    #[error("Invalid receipt: {0}")]
    Receipt(#[from] titan_core::CoreError),

    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("Invalid print configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

fn summarize(attempts: &[DriverAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<toml::de::Error> for PrintError {
    fn from(err: toml::de::Error) -> Self {
        PrintError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for PrintError {
    fn from(err: toml::ser::Error) -> Self {
        PrintError::ConfigSaveFailed(err.to_string())
    }
}

impl From<url::ParseError> for PrintError {
    fn from(err: url::ParseError) -> Self {
        PrintError::InvalidConfig(format!("invalid URL: {}", err))
    }
}

impl From<reqwest::Error> for PrintError {
    fn from(err: reqwest::Error) -> Self {
        PrintError::BridgeUnreachable(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl PrintError {
    /// True when trying again might produce paper.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PrintError::TransportUnavailable(_)
                | PrintError::TransportFailed { .. }
                | PrintError::FileFallback { .. }
                | PrintError::Timeout(_)
                | PrintError::LinkUnavailable(_)
                | PrintError::Link(_)
                | PrintError::BridgeUnreachable(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            PrintError::InvalidConfig(_)
                | PrintError::ConfigLoadFailed(_)
                | PrintError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::AttemptOutcome;

    #[test]
    fn test_transport_failed_lists_every_driver() {
        let err = PrintError::TransportFailed {
            attempts: vec![
                DriverAttempt::new("rfcomm", AttemptOutcome::DriverFailed("broken pipe".into())),
                DriverAttempt::new("spp", AttemptOutcome::DriverFailed("no channel".into())),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("rfcomm: failed: broken pipe"));
        assert!(message.contains("spp: failed: no channel"));
    }

    #[test]
    fn test_file_fallback_is_retryable_failure() {
        let err = PrintError::FileFallback {
            path: PathBuf::from("/tmp/R-1.txt"),
            reason: "printer off".into(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("/tmp/R-1.txt"));
    }

    #[test]
    fn test_invalid_request_is_not_retryable() {
        assert!(!PrintError::InvalidRequest("empty".into()).is_retryable());
        assert!(PrintError::InvalidConfig("port".into()).is_config_error());
    }
}
