//! # API Error Types
//!
//! Error types for the resilient API client.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       API Error Categories                              │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Offline      │  │   Live call     │  │     Local               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  OfflineNoCache │  │  Timeout        │  │  Storage                │ │
//! │  │  OfflineQueued  │  │  Network        │  │  Decode                 │ │
//! │  │                 │  │  TransportRej.  │  │  InvalidRequest         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │  Configuration  │   Timeout and Network both allow a read to fall   │
//! │  │                 │   back to the cache. TransportRejected is the     │
//! │  │  InvalidConfig  │   server's verdict and is surfaced verbatim.      │
//! │  │  InvalidUrl     │                                                    │
//! │  │  ConfigLoad/Save│                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Every way a dispatch can fail.
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Offline
    // =========================================================================
    /// Unreachable, read requested, nothing cached for the endpoint.
    #[error("Offline and no cached data for {endpoint}")]
    OfflineNoCache { endpoint: String },

    /// The write was queued for replay; no server confirmation yet.
    #[error("Offline: action {action_id} queued for replay")]
    OfflineQueued { action_id: Uuid },

    // =========================================================================
    // Live Call
    // =========================================================================
    /// The live call did not finish within the request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with an error status.
    #[error("Server rejected request ({status}): {message}")]
    TransportRejected { status: u16, message: String },

    /// Response body was not valid JSON.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Request could not be built (bad endpoint, bad header).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Local
    // =========================================================================
    /// Cache or queue persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<titan_db::DbError> for ApiError {
    fn from(err: titan_db::DbError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ApiError {
    fn from(err: toml::de::Error) -> Self {
        ApiError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ApiError {
    fn from(err: toml::ser::Error) -> Self {
        ApiError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl ApiError {
    /// True for the two offline outcomes.
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            ApiError::OfflineNoCache { .. } | ApiError::OfflineQueued { .. }
        )
    }

    /// True when a failed live read may be answered from the cache.
    ///
    /// Timeouts and network failures qualify; a server rejection does not.
    pub fn allows_cache_fallback(&self) -> bool {
        matches!(self, ApiError::Timeout(_) | ApiError::Network(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidConfig(_)
                | ApiError::InvalidUrl(_)
                | ApiError::ConfigLoadFailed(_)
                | ApiError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_fallback_classes() {
        assert!(ApiError::Timeout(30).allows_cache_fallback());
        assert!(ApiError::Network("reset".into()).allows_cache_fallback());

        assert!(!ApiError::TransportRejected {
            status: 404,
            message: "gone".into()
        }
        .allows_cache_fallback());
        assert!(!ApiError::Decode("eof".into()).allows_cache_fallback());
    }

    #[test]
    fn test_timeout_is_distinct_from_network() {
        let timeout = ApiError::Timeout(30);
        assert!(!matches!(timeout, ApiError::Network(_)));
        assert_eq!(timeout.to_string(), "Request timed out after 30 seconds");
    }

    #[test]
    fn test_offline_classes() {
        let queued = ApiError::OfflineQueued {
            action_id: Uuid::new_v4(),
        };
        assert!(queued.is_offline());
        assert!(ApiError::OfflineNoCache {
            endpoint: "/things".into()
        }
        .is_offline());
        assert!(!ApiError::Timeout(1).is_offline());
    }

    #[test]
    fn test_db_error_maps_to_storage() {
        let err: ApiError = titan_db::DbError::Unavailable("off".into()).into();
        assert!(matches!(err, ApiError::Storage(_)));
    }
}
