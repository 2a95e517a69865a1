//! # Print Bridge Service
//!
//! The local, always-on HTTP surface in front of the printer.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Print Bridge Service                             │
//! │                                                                         │
//! │  POST /print {lines}          POST /api/print/receipt {receiptData}    │
//! │       │                                │                                │
//! │       │ validate (400)                 │ deliver_receipt: format at     │
//! │       ▼                                ▼ configured width               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ BridgeState::deliver                                             │  │
//! │  │   re-wrap any line wider than line_width                         │  │
//! │  │   timeout(print_timeout) {                                       │  │
//! │  │     per-device lock          ← one job at a time per printer     │  │
//! │  │     DriverChain::deliver     ← rfcomm, then spp                  │  │
//! │  │   }                                                              │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │       │                                │                                │
//! │       ▼                                ▼ on failure, if configured      │
//! │  200 {ok:true}                    FileFallback → {success:false,        │
//! │  400/502/503/504 {message}                        fileSaved:true}       │
//! │                                                                         │
//! │  GET /health → {status:"ok"}                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Codes
//! | Error                 | Status |
//! |-----------------------|--------|
//! | invalid body          | 400    |
//! | no driver available   | 503    |
//! | every driver failed   | 502    |
//! | print budget exceeded | 504    |

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use titan_core::format::wrap_text;
use titan_core::{Receipt, ReceiptFormatter};

use crate::client::BridgeClient;
use crate::config::PrintConfig;
use crate::driver::DriverChain;
use crate::error::{PrintError, PrintResult};
use crate::fallback::FileFallback;

/// Lock key used when no device address is configured.
const DEFAULT_DEVICE_KEY: &str = "default";

// =============================================================================
// Per-Device Serialization
// =============================================================================

/// One async mutex per device; a printer handles one job at a time.
#[derive(Default)]
pub struct DeviceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DeviceLocks {
    pub fn lock_for(&self, device: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(device.to_string()).or_default().clone()
    }
}

// =============================================================================
// Bridge State
// =============================================================================

/// Shared state for the bridge handlers.
pub struct BridgeState {
    chain: DriverChain,
    device_key: String,
    locks: DeviceLocks,
    formatter: ReceiptFormatter,
    timeout: Duration,
    fallback: Option<FileFallback>,
}

impl BridgeState {
    pub fn new(chain: DriverChain, formatter: ReceiptFormatter, timeout: Duration) -> Self {
        BridgeState {
            chain,
            device_key: DEFAULT_DEVICE_KEY.to_string(),
            locks: DeviceLocks::default(),
            formatter,
            timeout,
            fallback: None,
        }
    }

    /// Builds state from configuration around an assembled driver chain.
    pub fn from_config(config: &PrintConfig, chain: DriverChain) -> Self {
        let formatter =
            ReceiptFormatter::new(config.receipt.line_width).currency(config.receipt.currency.clone());

        let mut state = Self::new(chain, formatter, config.print_timeout());
        if let Some(ref address) = config.device.address {
            state.device_key = address.clone();
        }
        if let Some(ref dir) = config.bridge.fallback_dir {
            state.fallback = Some(FileFallback::new(dir));
        }
        state
    }

    pub fn with_fallback(mut self, fallback: FileFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn line_width(&self) -> usize {
        self.formatter.width()
    }

    /// Prints lines on the configured device. Returns the delivering
    /// driver's name.
    pub async fn deliver(&self, lines: Vec<String>) -> PrintResult<String> {
        let lines = rewrap_lines(&lines, self.line_width());
        debug!(lines = lines.len(), device = %self.device_key, "Print job received");

        let job = async {
            let lock = self.locks.lock_for(&self.device_key);
            let _guard = lock.lock().await;
            self.chain.deliver(&lines).await
        };

        match tokio::time::timeout(self.timeout, job).await {
            Ok(report) => report.into_result(),
            Err(_) => {
                error!(
                    device = %self.device_key,
                    timeout_secs = self.timeout.as_secs(),
                    "Print job timed out"
                );
                Err(PrintError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    /// Formats and prints a receipt. When printing fails and a fallback
    /// directory is configured, the receipt is saved there and the result is
    /// `PrintError::FileFallback`, which is still a failure.
    pub async fn deliver_receipt(&self, receipt: &Receipt) -> PrintResult<String> {
        let lines = self.formatter.format(receipt);

        let err = match self.deliver(lines.clone()).await {
            Ok(driver) => {
                info!(receipt_number = receipt.receipt_number(), driver = %driver, "Receipt printed");
                return Ok(driver);
            }
            Err(e) => e,
        };

        let Some(ref fallback) = self.fallback else {
            return Err(err);
        };

        match fallback.save(receipt.receipt_number(), &lines).await {
            Ok(path) => {
                warn!(receipt_number = receipt.receipt_number(), error = %err, "Receipt not printed, saved to file");
                Err(PrintError::FileFallback {
                    path,
                    reason: err.to_string(),
                })
            }
            Err(save_err) => {
                error!(error = %save_err, "Fallback save failed");
                Err(err)
            }
        }
    }
}

/// Splits every line wider than `width` so nothing reaches the printer
/// longer than a paper line.
pub fn rewrap_lines(lines: &[String], width: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if line.chars().count() <= width {
            out.push(line.clone());
        } else {
            out.extend(
                wrap_text(line, width)
                    .into_iter()
                    .map(|chunk| chunk.trim_end().to_string()),
            );
        }
    }
    out
}

// =============================================================================
// Router
// =============================================================================

/// Builds the bridge router.
pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/print", post(print_handler))
        .route("/health", get(health_handler))
        .route("/api/print/receipt", post(print_receipt_handler))
        .with_state(state)
}

/// Liveness endpoint.
pub async fn health_handler(State(state): State<Arc<BridgeState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "drivers": state.chain.driver_names(),
    }))
}

/// `POST /print` with `{lines: [string, ...]}`.
pub async fn print_handler(
    State(state): State<Arc<BridgeState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let lines = match body {
        Ok(Json(value)) => parse_lines(&value),
        Err(rejection) => Err(PrintError::InvalidRequest(rejection.body_text())),
    };

    let result = match lines {
        Ok(lines) => state.deliver(lines).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(driver) => Json(json!({ "ok": true, "driver": driver })).into_response(),
        Err(e) => e.into_response(),
    }
}

fn parse_lines(value: &Value) -> PrintResult<Vec<String>> {
    let invalid = || PrintError::InvalidRequest("lines must be a non-empty array of strings".into());

    let items = value
        .get("lines")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(invalid)?;

    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

/// Body of `POST /api/print/receipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPrintRequest {
    pub receipt_data: Receipt,
}

/// `POST /api/print/receipt`: formats server-side, then prints.
pub async fn print_receipt_handler(
    State(state): State<Arc<BridgeState>>,
    body: Result<Json<ReceiptPrintRequest>, JsonRejection>,
) -> Response {
    let receipt = match body {
        Ok(Json(request)) => request.receipt_data,
        Err(rejection) => {
            let status = rejection.status();
            return (
                status,
                Json(json!({ "success": false, "message": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match state.deliver_receipt(&receipt).await {
        Ok(driver) => Json(json!({ "success": true, "driver": driver })).into_response(),
        Err(PrintError::FileFallback { path, reason }) => {
            let saved = PrintError::FileFallback {
                path: path.clone(),
                reason,
            };
            (
                saved.status_code(),
                Json(json!({
                    "success": false,
                    "message": saved.to_string(),
                    "fileSaved": true,
                    "filePath": path.display().to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => (
            e.status_code(),
            Json(json!({ "success": false, "message": e.to_string(), "fileSaved": false })),
        )
            .into_response(),
    }
}

// =============================================================================
// In-Process Bridge
// =============================================================================

/// Lets a single-process deployment drive the orchestrator without HTTP.
#[async_trait]
impl BridgeClient for BridgeState {
    async fn print_lines(&self, lines: &[String]) -> PrintResult<()> {
        self.deliver(lines.to_vec()).await.map(|_| ())
    }

    async fn print_receipt(&self, receipt: &Receipt) -> PrintResult<()> {
        self.deliver_receipt(receipt).await.map(|_| ())
    }

    async fn health(&self) -> bool {
        !self.chain.is_empty()
    }
}

// =============================================================================
// Error Responses
// =============================================================================

impl PrintError {
    /// HTTP status the bridge answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PrintError::InvalidRequest(_) | PrintError::Receipt(_) => StatusCode::BAD_REQUEST,
            PrintError::TransportUnavailable(_) | PrintError::LinkUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PrintError::TransportFailed { .. }
            | PrintError::Link(_)
            | PrintError::FileFallback { .. } => StatusCode::BAD_GATEWAY,
            PrintError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PrintError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "message": self.to_string() }))).into_response()
    }
}

// =============================================================================
// Bridge Server
// =============================================================================

/// Runs the router on a TCP listener.
pub struct BridgeServer {
    bind_addr: String,
    state: Arc<BridgeState>,
}

/// Handle for a running bridge.
pub struct BridgeHandle {
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests, lets in-flight ones finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }

    /// Waits for the server to exit on its own.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

impl BridgeServer {
    pub fn new(bind_addr: impl Into<String>, state: Arc<BridgeState>) -> Self {
        BridgeServer {
            bind_addr: bind_addr.into(),
            state,
        }
    }

    /// Binds the listener and spawns the server.
    pub async fn start(self) -> PrintResult<BridgeHandle> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let app = router(self.state);

        let listener = TcpListener::bind(&self.bind_addr).await.map_err(|e| {
            PrintError::InvalidConfig(format!("Failed to bind to {}: {}", self.bind_addr, e))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| PrintError::InvalidConfig(e.to_string()))?;

        info!(addr = %local_addr, "Print bridge listening");

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await;
                    info!("Print bridge shutting down");
                })
                .await;

            if let Err(e) = result {
                error!(error = %e, "Print bridge server error");
            }
        });

        Ok(BridgeHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::driver::{AttemptOutcome, PrintDriver};
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use titan_core::{Money, PaymentMethod};

    /// Driver with a fixed outcome that records the jobs it saw.
    pub(crate) struct ScriptedDriver {
        pub name: &'static str,
        pub outcome: AttemptOutcome,
        pub jobs: Mutex<Vec<Vec<String>>>,
        pub delay: Option<Duration>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl ScriptedDriver {
        pub fn new(name: &'static str, outcome: AttemptOutcome) -> Self {
            ScriptedDriver {
                name,
                outcome,
                jobs: Mutex::new(Vec::new()),
                delay: None,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PrintDriver for ScriptedDriver {
        fn name(&self) -> &str {
            self.name
        }

        async fn deliver(&self, lines: &[String]) -> AttemptOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.jobs.lock().unwrap().push(lines.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn state_with(drivers: Vec<Arc<dyn PrintDriver>>) -> Arc<BridgeState> {
        Arc::new(BridgeState::new(
            DriverChain::new(drivers),
            ReceiptFormatter::new(32),
            Duration::from_secs(20),
        ))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn receipt() -> Receipt {
        Receipt::builder("R-0001")
            .item("Pants (Size M, Blue)", 1, Money::from_major(499))
            .payment(PaymentMethod::Cash, Money::from_major(500))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_print_success() {
        let driver = Arc::new(ScriptedDriver::new("rfcomm", AttemptOutcome::Success));
        let state = state_with(vec![driver.clone()]);

        let response = print_handler(State(state), Ok(Json(json!({"lines": ["Hello", "World"]})))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"ok": true, "driver": "rfcomm"}));
        assert_eq!(driver.jobs.lock().unwrap()[0], vec!["Hello", "World"]);
    }

    #[tokio::test]
    async fn test_print_rejects_bad_bodies() {
        let state = state_with(vec![Arc::new(ScriptedDriver::new("rfcomm", AttemptOutcome::Success))]);

        for body in [json!({"lines": []}), json!({"lines": "x"}), json!({}), json!({"lines": [1]})] {
            let response = print_handler(State(state.clone()), Ok(Json(body))).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = body_json(response).await;
            assert!(body["message"].as_str().unwrap().contains("non-empty array"));
        }
    }

    #[tokio::test]
    async fn test_overlong_lines_are_rewrapped() {
        let driver = Arc::new(ScriptedDriver::new("rfcomm", AttemptOutcome::Success));
        let state = state_with(vec![driver.clone()]);
        let long = "Thank you for shopping with us, come again soon";

        print_handler(State(state), Ok(Json(json!({"lines": [long]})))).await;

        let job = driver.jobs.lock().unwrap()[0].clone();
        assert!(job.len() >= 2);
        assert!(job.iter().all(|l| l.chars().count() <= 32));
        assert_eq!(job.join(" "), long);
    }

    #[tokio::test]
    async fn test_secondary_success_is_not_an_error() {
        let primary = Arc::new(ScriptedDriver::new(
            "rfcomm",
            AttemptOutcome::DriverFailed("broken pipe".into()),
        ));
        let secondary = Arc::new(ScriptedDriver::new("spp", AttemptOutcome::Success));
        let state = state_with(vec![primary, secondary]);

        let response = print_handler(State(state), Ok(Json(json!({"lines": ["x"]})))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["driver"], "spp");
    }

    #[tokio::test]
    async fn test_status_codes_for_driver_failures() {
        let unavailable = state_with(vec![Arc::new(ScriptedDriver::new(
            "rfcomm",
            AttemptOutcome::DriverUnavailable("no node".into()),
        ))]);
        let response = print_handler(State(unavailable), Ok(Json(json!({"lines": ["x"]})))).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let failed = state_with(vec![Arc::new(ScriptedDriver::new(
            "rfcomm",
            AttemptOutcome::DriverFailed("EIO".into()),
        ))]);
        let response = print_handler(State(failed), Ok(Json(json!({"lines": ["x"]})))).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_json(response).await["message"].as_str().unwrap().contains("EIO"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_driver_times_out() {
        let mut driver = ScriptedDriver::new("rfcomm", AttemptOutcome::Success);
        driver.delay = Some(Duration::from_secs(60));
        let state = state_with(vec![Arc::new(driver)]);

        let response = print_handler(State(state), Ok(Json(json!({"lines": ["x"]})))).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_jobs_are_serialized_per_device() {
        let mut driver = ScriptedDriver::new("rfcomm", AttemptOutcome::Success);
        driver.delay = Some(Duration::from_millis(500));
        let driver = Arc::new(driver);
        let state = state_with(vec![driver.clone()]);

        let (a, b) = tokio::join!(
            state.deliver(vec!["job a".into()]),
            state.deliver(vec!["job b".into()]),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(driver.jobs.lock().unwrap().len(), 2);
        assert_eq!(driver.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_health() {
        let state = state_with(vec![Arc::new(ScriptedDriver::new("rfcomm", AttemptOutcome::Success))]);
        let Json(body) = health_handler(State(state)).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_receipt_endpoint_formats_and_prints() {
        let driver = Arc::new(ScriptedDriver::new("rfcomm", AttemptOutcome::Success));
        let state = state_with(vec![driver.clone()]);

        let request: ReceiptPrintRequest =
            serde_json::from_value(json!({ "receiptData": receipt() })).unwrap();
        let response = print_receipt_handler(State(state), Ok(Json(request))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);

        let job = driver.jobs.lock().unwrap()[0].clone();
        assert!(job.iter().any(|l| l == "Pants (Size M, Blue)  1   499.00"));
        assert!(job.iter().all(|l| l.chars().count() == 32));
    }

    #[tokio::test]
    async fn test_receipt_failure_saves_file_but_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let state = BridgeState::new(
            DriverChain::new(vec![Arc::new(ScriptedDriver::new(
                "rfcomm",
                AttemptOutcome::DriverFailed("paper out".into()),
            ))]),
            ReceiptFormatter::new(32),
            Duration::from_secs(20),
        )
        .with_fallback(FileFallback::new(dir.path()));

        let request: ReceiptPrintRequest =
            serde_json::from_value(json!({ "receiptData": receipt() })).unwrap();
        let response = print_receipt_handler(State(Arc::new(state)), Ok(Json(request))).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["fileSaved"], true);
        assert!(body["message"].as_str().unwrap().contains("paper out"));

        let path = body["filePath"].as_str().unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("R-0001"));
    }

    #[test]
    fn test_rewrap_leaves_short_lines_alone() {
        let lines = vec!["short".to_string(), "x".repeat(40)];
        let out = rewrap_lines(&lines, 32);

        assert_eq!(out[0], "short");
        assert_eq!(out[1].len(), 32);
        assert_eq!(out[2].len(), 8);
    }
}
