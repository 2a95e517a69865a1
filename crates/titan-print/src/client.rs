//! # Bridge Client
//!
//! The POS side of the print bridge. [`BridgeClient`] is the seam the
//! orchestrator talks through; [`HttpBridgeClient`] is the reqwest
//! implementation.
//!
//! ## Response Mapping
//! ```text
//!   2xx                              → Ok(())
//!   {success:false, fileSaved:true}  → PrintError::FileFallback
//!   any other non-2xx                → PrintError::BridgeRejected { status, message }
//!   connect / read failure           → PrintError::BridgeUnreachable
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use titan_core::Receipt;

use crate::config::PrintConfig;
use crate::error::{PrintError, PrintResult};

/// What the orchestrator needs from a bridge.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Prints already-formatted lines.
    async fn print_lines(&self, lines: &[String]) -> PrintResult<()>;

    /// Sends a structured receipt for the bridge to format and print.
    async fn print_receipt(&self, receipt: &Receipt) -> PrintResult<()>;

    /// True when the bridge answers its health check.
    async fn health(&self) -> bool;
}

/// reqwest-backed bridge client.
#[derive(Debug, Clone)]
pub struct HttpBridgeClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpBridgeClient {
    pub fn new(base_url: &str, timeout: Duration) -> PrintResult<Self> {
        let base = Url::parse(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PrintError::InvalidConfig(e.to_string()))?;

        Ok(HttpBridgeClient { http, base })
    }

    pub fn from_config(config: &PrintConfig) -> PrintResult<Self> {
        Self::new(&config.client.bridge_url, config.submit_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn post(&self, path: &str, body: Value) -> PrintResult<()> {
        let url = self.base.join(path)?;
        debug!(url = %url, "Sending print request to bridge");

        let response = self.http.post(url).json(&body).send().await.map_err(map_send_error)?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        interpret_response(status.as_u16(), &payload)
    }
}

fn map_send_error(err: reqwest::Error) -> PrintError {
    if err.is_timeout() {
        warn!(error = %err, "Print bridge request timed out");
    }
    PrintError::from(err)
}

/// Maps a bridge reply onto the client's result.
pub fn interpret_response(status: u16, payload: &Value) -> PrintResult<()> {
    let declined = payload.get("success").and_then(Value::as_bool) == Some(false);
    if (200..300).contains(&status) && !declined {
        return Ok(());
    }

    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status));

    let file_saved = payload.get("fileSaved").and_then(Value::as_bool) == Some(true);
    if file_saved {
        if let Some(path) = payload.get("filePath").and_then(Value::as_str) {
            return Err(PrintError::FileFallback {
                path: PathBuf::from(path),
                reason: message,
            });
        }
    }

    Err(PrintError::BridgeRejected { status, message })
}

#[async_trait]
impl BridgeClient for HttpBridgeClient {
    async fn print_lines(&self, lines: &[String]) -> PrintResult<()> {
        self.post("print", json!({ "lines": lines })).await
    }

    async fn print_receipt(&self, receipt: &Receipt) -> PrintResult<()> {
        self.post("api/print/receipt", json!({ "receiptData": receipt })).await
    }

    async fn health(&self) -> bool {
        let Ok(url) = self.base.join("health") else {
            return false;
        };

        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<Value>()
                .await
                .map(|body| body.get("status").and_then(Value::as_str) == Some("ok"))
                .unwrap_or(false),
            Ok(_) => false,
            Err(e) => {
                debug!(error = %e, "Print bridge health check failed");
                false
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::ScriptedDriver;
    use crate::bridge::{BridgeServer, BridgeState};
    use crate::driver::{AttemptOutcome, DriverChain};
    use std::sync::Arc;
    use titan_core::ReceiptFormatter;

    #[test]
    fn test_success_and_rejection_mapping() {
        assert!(interpret_response(200, &json!({"ok": true})).is_ok());
        assert!(interpret_response(200, &Value::Null).is_ok());

        match interpret_response(400, &json!({"message": "lines must be a non-empty array of strings"})) {
            Err(PrintError::BridgeRejected { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("non-empty"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        match interpret_response(502, &Value::Null) {
            Err(PrintError::BridgeRejected { message, .. }) => assert_eq!(message, "HTTP 502"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_file_saved_is_a_failure() {
        let payload = json!({
            "success": false,
            "message": "paper out",
            "fileSaved": true,
            "filePath": "/var/receipts/R-1.txt",
        });

        match interpret_response(502, &payload) {
            Err(PrintError::FileFallback { path, reason }) => {
                assert_eq!(path, PathBuf::from("/var/receipts/R-1.txt"));
                assert_eq!(reason, "paper out");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpBridgeClient::new("not a url", Duration::from_secs(1)),
            Err(PrintError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_bridge() {
        let client = HttpBridgeClient::new("http://127.0.0.1:1/", Duration::from_secs(2)).unwrap();

        let err = client.print_lines(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, PrintError::BridgeUnreachable(_)));
        assert!(!client.health().await);
    }

    #[tokio::test]
    async fn test_round_trip_through_running_bridge() {
        let driver = Arc::new(ScriptedDriver::new("rfcomm", AttemptOutcome::Success));
        let state = BridgeState::new(
            DriverChain::new(vec![driver.clone()]),
            ReceiptFormatter::new(32),
            Duration::from_secs(5),
        );
        let handle = BridgeServer::new("127.0.0.1:0", Arc::new(state))
            .start()
            .await
            .unwrap();

        let base = format!("http://{}/", handle.local_addr());
        let client = HttpBridgeClient::new(&base, Duration::from_secs(5)).unwrap();

        assert!(client.health().await);
        client
            .print_lines(&["Hello".to_string(), "World".to_string()])
            .await
            .unwrap();
        assert_eq!(driver.jobs.lock().unwrap()[0], vec!["Hello", "World"]);

        handle.shutdown().await;
    }
}
