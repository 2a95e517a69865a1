//! # Print Orchestrator
//!
//! Client-side state machine that owns one receipt's trip to paper.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PrintOrchestrator                               │
//! │                                                                         │
//! │            submit(receipt)                                              │
//! │   Idle ─────────────────────► Printing ──── bridge ok ────► Succeeded   │
//! │    ▲                             │  ▲                           ▲       │
//! │    │                             │  │ retry()                   │       │
//! │    │ dismiss()          error /  │  │ attempt_count += 1        │       │
//! │    │ (late result       timeout  ▼  │                           │       │
//! │    │  is discarded)           Failed { message } ── confirm() ──┘       │
//! │    └──────────────────────────────┘   "paper came out anyway"           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The structured receipt goes to the bridge, which formats it at the
//! printer's width and may save it to a file when no driver prints. A saved
//! file still ends in `Failed`.
//!
//! The bridge call runs under the submit timeout, which is the bridge's own
//! print budget plus a margin. A slow print that the bridge still finishes
//! is reported as success instead of racing it. Expiry always ends in
//! `Failed`, so the UI never stays stuck on "printing".
//!
//! Every submit bumps a generation counter. `dismiss()` bumps it too, which
//! makes any result still in flight stale: it is logged and dropped.
//!
//! State changes are published on a `watch` channel for the UI.
//!
//! Automatic post-payment prints wait for a print already in progress
//! instead of being dropped. The orchestrator remembers the last
//! `AUTO_PRINT_MEMORY` auto-printed receipt numbers.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use titan_core::{Receipt, ReceiptFormatter};

use crate::client::BridgeClient;
use crate::config::PrintConfig;
use crate::error::{PrintError, PrintResult};

/// How many auto-printed receipt numbers are remembered.
const AUTO_PRINT_MEMORY: usize = 64;

// =============================================================================
// Public Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintState {
    Idle,
    Printing,
    Succeeded,
    /// The concrete error, for the UI to show next to Retry and Confirm.
    Failed { message: String },
}

impl PrintState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PrintState::Succeeded | PrintState::Failed { .. })
    }
}

/// Whether a flow may print without the user asking.
///
/// Post-payment screens pass `Once`; reprints from history pass `Never`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPrint {
    Once,
    Never,
}

/// The current print attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    /// Local preview of the receipt; the bridge formats its own copy.
    pub lines: Vec<String>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Default)]
struct Inner {
    receipt: Option<Receipt>,
    job: Option<PrintJob>,
    generation: u64,
    auto_printed: HashSet<String>,
    auto_order: VecDeque<String>,
}

impl Inner {
    fn remember_auto_print(&mut self, receipt_number: &str) {
        if !self.auto_printed.insert(receipt_number.to_string()) {
            return;
        }
        self.auto_order.push_back(receipt_number.to_string());
        while self.auto_order.len() > AUTO_PRINT_MEMORY {
            if let Some(oldest) = self.auto_order.pop_front() {
                self.auto_printed.remove(&oldest);
            }
        }
    }
}

pub struct PrintOrchestrator {
    bridge: Arc<dyn BridgeClient>,
    formatter: ReceiptFormatter,
    timeout: Duration,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<PrintState>,
}

impl PrintOrchestrator {
    pub fn new(bridge: Arc<dyn BridgeClient>, formatter: ReceiptFormatter, timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(PrintState::Idle);
        PrintOrchestrator {
            bridge,
            formatter,
            timeout,
            inner: Mutex::new(Inner::default()),
            state_tx,
        }
    }

    pub fn from_config(bridge: Arc<dyn BridgeClient>, config: &PrintConfig) -> Self {
        let formatter =
            ReceiptFormatter::new(config.receipt.line_width).currency(config.receipt.currency.clone());
        Self::new(bridge, formatter, config.submit_timeout())
    }

    pub fn state(&self) -> PrintState {
        self.state_tx.borrow().clone()
    }

    /// Receiver for UI updates.
    pub fn watch(&self) -> watch::Receiver<PrintState> {
        self.state_tx.subscribe()
    }

    pub fn job(&self) -> Option<PrintJob> {
        self.lock().job.clone()
    }

    pub fn attempt_count(&self) -> u32 {
        self.lock().job.as_ref().map_or(0, |job| job.attempt_count)
    }

    /// Prints a receipt as a fresh job (`attempt_count = 1`).
    pub async fn submit(&self, receipt: &Receipt) -> PrintState {
        self.run(receipt.clone(), 1).await
    }

    /// Submits again with the same receipt after a failure.
    pub async fn retry(&self) -> PrintResult<PrintState> {
        let (receipt, attempt) = {
            let inner = self.lock();
            if !matches!(*self.state_tx.borrow(), PrintState::Failed { .. }) {
                return Err(PrintError::InvalidRequest("no failed print to retry".into()));
            }
            let receipt = inner
                .receipt
                .clone()
                .ok_or_else(|| PrintError::InvalidRequest("no failed print to retry".into()))?;
            let attempt = inner.job.as_ref().map_or(1, |job| job.attempt_count + 1);
            (receipt, attempt)
        };

        info!(receipt_number = receipt.receipt_number(), attempt, "Retrying print");
        Ok(self.run(receipt, attempt).await)
    }

    /// User says the paper printed despite the error.
    pub fn confirm(&self) -> bool {
        let _inner = self.lock();
        let failed = matches!(*self.state_tx.borrow(), PrintState::Failed { .. });
        if failed {
            info!("Print confirmed manually");
            self.state_tx.send_replace(PrintState::Succeeded);
        }
        failed
    }

    /// Abandons the current job; a result still in flight is discarded.
    pub fn dismiss(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.job = None;
        inner.receipt = None;
        self.state_tx.send_replace(PrintState::Idle);
    }

    /// Entry point for checkout flows. Prints at most once per receipt
    /// number when `auto` is `Once`, waiting for any print in progress;
    /// returns `None` when nothing was sent.
    pub async fn on_payment_complete(&self, receipt: &Receipt, auto: AutoPrint) -> Option<PrintState> {
        if auto == AutoPrint::Never {
            return None;
        }

        let receipt_number = receipt.receipt_number();
        let mut rx = self.state_tx.subscribe();

        loop {
            let started = {
                let mut inner = self.lock();
                if inner.auto_printed.contains(receipt_number) {
                    debug!(receipt_number, "Receipt already auto-printed");
                    return None;
                }
                let generation = self.begin(&mut inner, receipt.clone(), 1);
                if generation.is_some() {
                    inner.remember_auto_print(receipt_number);
                }
                generation
            };

            if let Some(generation) = started {
                return Some(self.finish(generation, receipt, 1).await);
            }

            debug!(receipt_number, "Auto-print waiting for the current print");
            if rx.wait_for(|s| *s != PrintState::Printing).await.is_err() {
                return None;
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn run(&self, receipt: Receipt, attempt_count: u32) -> PrintState {
        let generation = {
            let mut inner = self.lock();
            match self.begin(&mut inner, receipt.clone(), attempt_count) {
                Some(generation) => generation,
                None => {
                    warn!(receipt_number = receipt.receipt_number(), "Print already in progress, ignoring submit");
                    return PrintState::Printing;
                }
            }
        };

        self.finish(generation, &receipt, attempt_count).await
    }

    /// Moves to `Printing` under the caller's lock. `None` when a print is
    /// already running.
    fn begin(&self, inner: &mut Inner, receipt: Receipt, attempt_count: u32) -> Option<u64> {
        if *self.state_tx.borrow() == PrintState::Printing {
            return None;
        }

        inner.generation += 1;
        inner.job = Some(PrintJob {
            lines: self.formatter.format(&receipt),
            attempt_count,
            last_error: None,
        });
        inner.receipt = Some(receipt);
        self.state_tx.send_replace(PrintState::Printing);
        Some(inner.generation)
    }

    async fn finish(&self, generation: u64, receipt: &Receipt, attempt_count: u32) -> PrintState {
        let result = match tokio::time::timeout(self.timeout, self.bridge.print_receipt(receipt)).await {
            Ok(result) => result,
            Err(_) => Err(PrintError::Timeout(self.timeout.as_secs())),
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, "Discarding late print result");
            return self.state_tx.borrow().clone();
        }

        let next = match result {
            Ok(()) => {
                info!(attempt_count, "Receipt printed");
                PrintState::Succeeded
            }
            Err(e) => {
                warn!(attempt_count, error = %e, "Receipt print failed");
                let message = e.to_string();
                if let Some(job) = inner.job.as_mut() {
                    job.last_error = Some(message.clone());
                }
                PrintState::Failed { message }
            }
        };

        self.state_tx.send_replace(next.clone());
        next
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::ScriptedDriver;
    use crate::bridge::BridgeState;
    use crate::driver::{AttemptOutcome, DriverChain, PrintDriver};
    use crate::fallback::FileFallback;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use titan_core::{Money, PaymentMethod};

    /// Bridge that answers from a script, optionally after a delay.
    #[derive(Default)]
    struct FakeBridge {
        script: Mutex<VecDeque<PrintResult<()>>>,
        delay: Option<Duration>,
        /// Receipt numbers in submission order.
        calls: Mutex<Vec<String>>,
    }

    impl FakeBridge {
        fn scripted(results: Vec<PrintResult<()>>) -> Self {
            FakeBridge {
                script: Mutex::new(results.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl BridgeClient for FakeBridge {
        async fn print_lines(&self, _lines: &[String]) -> PrintResult<()> {
            unreachable!("orchestrator submits structured receipts")
        }

        async fn print_receipt(&self, receipt: &Receipt) -> PrintResult<()> {
            self.calls.lock().unwrap().push(receipt.receipt_number().to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn health(&self) -> bool {
            true
        }
    }

    fn receipt(number: &str) -> Receipt {
        Receipt::builder(number)
            .item("Pants (Size M, Blue)", 1, Money::from_major(499))
            .payment(PaymentMethod::Cash, Money::from_major(500))
            .build()
            .unwrap()
    }

    fn orchestrator(bridge: Arc<dyn BridgeClient>) -> PrintOrchestrator {
        PrintOrchestrator::new(bridge, ReceiptFormatter::new(32), Duration::from_secs(25))
    }

    fn in_process(drivers: Vec<Arc<dyn PrintDriver>>) -> Arc<dyn BridgeClient> {
        Arc::new(BridgeState::new(
            DriverChain::new(drivers),
            ReceiptFormatter::new(32),
            Duration::from_secs(20),
        ))
    }

    #[tokio::test]
    async fn test_missing_primary_secondary_succeeds() {
        let bridge = in_process(vec![
            Arc::new(ScriptedDriver::new(
                "rfcomm",
                AttemptOutcome::DriverUnavailable("no channel".into()),
            )),
            Arc::new(ScriptedDriver::new("spp", AttemptOutcome::Success)),
        ]);
        let orchestrator = orchestrator(bridge);

        assert_eq!(orchestrator.submit(&receipt("R-1")).await, PrintState::Succeeded);
        assert_eq!(orchestrator.attempt_count(), 1);
        assert_eq!(orchestrator.job().unwrap().last_error, None);
    }

    #[tokio::test]
    async fn test_both_fail_then_retry_counts_attempts() {
        let rfcomm = Arc::new(ScriptedDriver::new(
            "rfcomm",
            AttemptOutcome::DriverFailed("broken pipe".into()),
        ));
        let spp = Arc::new(ScriptedDriver::new("spp", AttemptOutcome::DriverFailed("no channel".into())));
        let orchestrator = orchestrator(in_process(vec![rfcomm.clone(), spp]));

        match orchestrator.submit(&receipt("R-2")).await {
            PrintState::Failed { message } => assert!(message.contains("broken pipe")),
            other => panic!("unexpected: {:?}", other),
        }

        let state = orchestrator.retry().await.unwrap();
        assert!(matches!(state, PrintState::Failed { .. }));
        assert_eq!(orchestrator.attempt_count(), 2);
        assert_eq!(rfcomm.jobs.lock().unwrap().len(), 2);
        assert!(orchestrator.job().unwrap().last_error.is_some());
    }

    #[tokio::test]
    async fn test_retry_can_succeed_and_confirm_requires_failure() {
        let bridge = Arc::new(FakeBridge::scripted(vec![
            Err(PrintError::BridgeUnreachable("connection refused".into())),
            Ok(()),
        ]));
        let orchestrator = orchestrator(bridge.clone());

        assert!(matches!(orchestrator.submit(&receipt("R-3")).await, PrintState::Failed { .. }));
        assert_eq!(orchestrator.retry().await.unwrap(), PrintState::Succeeded);
        assert_eq!(orchestrator.attempt_count(), 2);

        assert!(!orchestrator.confirm());
        assert!(orchestrator.retry().await.is_err());

        assert_eq!(*bridge.calls.lock().unwrap(), vec!["R-3", "R-3"]);
    }

    #[tokio::test]
    async fn test_manual_confirm_after_failure() {
        let bridge = Arc::new(FakeBridge::scripted(vec![Err(PrintError::Timeout(20))]));
        let orchestrator = orchestrator(bridge);

        orchestrator.submit(&receipt("R-4")).await;
        assert!(orchestrator.confirm());
        assert_eq!(orchestrator.state(), PrintState::Succeeded);
    }

    #[tokio::test]
    async fn test_auto_print_flag() {
        let bridge = Arc::new(FakeBridge::default());
        let orchestrator = orchestrator(bridge.clone());
        let r = receipt("R-5");

        assert_eq!(orchestrator.on_payment_complete(&r, AutoPrint::Never).await, None);
        assert!(bridge.calls.lock().unwrap().is_empty());

        assert_eq!(
            orchestrator.on_payment_complete(&r, AutoPrint::Once).await,
            Some(PrintState::Succeeded)
        );
        assert_eq!(orchestrator.on_payment_complete(&r, AutoPrint::Once).await, None);
        assert_eq!(bridge.calls.lock().unwrap().len(), 1);

        // Explicit reprint is always allowed.
        assert_eq!(orchestrator.submit(&r).await, PrintState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_bridge_times_out_to_failed() {
        let bridge = Arc::new(FakeBridge {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let orchestrator = orchestrator(bridge);

        match orchestrator.submit(&receipt("R-6")).await {
            PrintState::Failed { message } => assert!(message.contains("timed out")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_discards_late_result() {
        let bridge = Arc::new(FakeBridge {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let orchestrator = Arc::new(orchestrator(bridge));
        let mut rx = orchestrator.watch();

        let task = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.submit(&receipt("R-7")).await }
        });

        rx.wait_for(|s| *s == PrintState::Printing).await.unwrap();
        orchestrator.dismiss();

        assert_eq!(task.await.unwrap(), PrintState::Idle);
        assert_eq!(orchestrator.state(), PrintState::Idle);
        assert!(orchestrator.job().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_while_printing_is_ignored() {
        let bridge = Arc::new(FakeBridge {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let orchestrator = Arc::new(orchestrator(bridge.clone()));
        let mut rx = orchestrator.watch();

        let task = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.submit(&receipt("R-8")).await }
        });
        rx.wait_for(|s| *s == PrintState::Printing).await.unwrap();

        assert_eq!(orchestrator.submit(&receipt("R-9")).await, PrintState::Printing);
        assert_eq!(task.await.unwrap(), PrintState::Succeeded);
        assert_eq!(bridge.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_print_waits_for_current_print() {
        let bridge = Arc::new(FakeBridge {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let orchestrator = Arc::new(orchestrator(bridge.clone()));
        let mut rx = orchestrator.watch();

        let task = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.submit(&receipt("R-8")).await }
        });
        rx.wait_for(|s| *s == PrintState::Printing).await.unwrap();

        let next = receipt("R-9");
        assert_eq!(
            orchestrator.on_payment_complete(&next, AutoPrint::Once).await,
            Some(PrintState::Succeeded)
        );
        assert_eq!(task.await.unwrap(), PrintState::Succeeded);
        assert_eq!(*bridge.calls.lock().unwrap(), vec!["R-8", "R-9"]);

        assert_eq!(orchestrator.on_payment_complete(&next, AutoPrint::Once).await, None);
        assert_eq!(bridge.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_saved_to_file_is_a_failed_print() {
        let bridge = Arc::new(FakeBridge::scripted(vec![Err(PrintError::FileFallback {
            path: PathBuf::from("/var/receipts/R-10.txt"),
            reason: "paper out".into(),
        })]));
        let orchestrator = orchestrator(bridge);

        match orchestrator.submit(&receipt("R-10")).await {
            PrintState::Failed { message } => {
                assert!(message.contains("saved to"));
                assert!(message.contains("paper out"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(orchestrator.confirm());
    }

    #[tokio::test]
    async fn test_in_process_fallback_ends_in_failed() {
        let dir = tempfile::tempdir().unwrap();
        let bridge: Arc<dyn BridgeClient> = Arc::new(
            BridgeState::new(
                DriverChain::new(vec![
                    Arc::new(ScriptedDriver::new("rfcomm", AttemptOutcome::DriverFailed("paper out".into()))),
                    Arc::new(ScriptedDriver::new("spp", AttemptOutcome::DriverUnavailable("no channel".into()))),
                ]),
                ReceiptFormatter::new(32),
                Duration::from_secs(20),
            )
            .with_fallback(FileFallback::new(dir.path())),
        );
        let orchestrator = orchestrator(bridge);

        match orchestrator.submit(&receipt("R-11")).await {
            PrintState::Failed { message } => assert!(message.contains("saved to")),
            other => panic!("unexpected: {:?}", other),
        }

        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(saved.len(), 1);
        let path = saved[0].as_ref().unwrap().path();
        assert!(std::fs::read_to_string(path).unwrap().contains("R-11"));
    }

    #[tokio::test]
    async fn test_auto_print_memory_is_bounded() {
        let bridge = Arc::new(FakeBridge::default());
        let orchestrator = orchestrator(bridge.clone());

        for i in 0..=AUTO_PRINT_MEMORY {
            let r = receipt(&format!("R-{}", i));
            assert!(orchestrator.on_payment_complete(&r, AutoPrint::Once).await.is_some());
        }

        {
            let inner = orchestrator.lock();
            assert_eq!(inner.auto_printed.len(), AUTO_PRINT_MEMORY);
            assert_eq!(inner.auto_order.len(), AUTO_PRINT_MEMORY);
            assert!(!inner.auto_printed.contains("R-0"));
        }

        let latest = receipt(&format!("R-{}", AUTO_PRINT_MEMORY));
        assert_eq!(orchestrator.on_payment_complete(&latest, AutoPrint::Once).await, None);
        assert_eq!(bridge.calls.lock().unwrap().len(), AUTO_PRINT_MEMORY + 1);
    }
}
