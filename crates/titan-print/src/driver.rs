//! # Print Drivers and Fallback Chain
//!
//! A driver delivers a list of lines to the printer over one transport. The
//! chain tries drivers in order and records what each one did.
//!
//! ## Fallback Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DriverChain::deliver                            │
//! │                                                                         │
//! │  received                                                               │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  drivers[0] (primary) ──► Success ─────────────────────────► done       │
//! │     │                                                                   │
//! │     │ DriverUnavailable | DriverFailed                                  │
//! │     ▼                                                                   │
//! │  drivers[1] (secondary) ──► Success ───────────────────────► done       │
//! │     │                                                                   │
//! │     │ DriverUnavailable | DriverFailed                                  │
//! │     ▼                                                                   │
//! │  all unavailable ──► PrintError::TransportUnavailable                   │
//! │  otherwise       ──► PrintError::TransportFailed { attempts }           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drivers return an [`AttemptOutcome`] instead of an error so the chain
//! never has to guess which failure is the one to report. When a later
//! driver succeeds the earlier failures stay in the report for logging but
//! are not the result.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PrintError, PrintResult};

// =============================================================================
// Attempt Outcome
// =============================================================================

/// What one driver did with one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Every byte was written and the link closed cleanly.
    Success,
    /// The driver could not even start (no device, no channel).
    DriverUnavailable(String),
    /// The driver started and then hit an error.
    DriverFailed(String),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    /// Classifies an error raised while a driver was setting up.
    pub fn from_setup_error(err: &PrintError) -> Self {
        match err {
            PrintError::LinkUnavailable(reason) | PrintError::TransportUnavailable(reason) => {
                AttemptOutcome::DriverUnavailable(reason.clone())
            }
            other => AttemptOutcome::DriverFailed(other.to_string()),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("ok"),
            AttemptOutcome::DriverUnavailable(reason) => write!(f, "unavailable: {}", reason),
            AttemptOutcome::DriverFailed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One driver's attempt, attributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverAttempt {
    pub driver: String,
    pub outcome: AttemptOutcome,
}

impl DriverAttempt {
    pub fn new(driver: impl Into<String>, outcome: AttemptOutcome) -> Self {
        DriverAttempt {
            driver: driver.into(),
            outcome,
        }
    }
}

impl fmt::Display for DriverAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.driver, self.outcome)
    }
}

// =============================================================================
// Driver Trait
// =============================================================================

/// Delivers lines over one transport.
#[async_trait]
pub trait PrintDriver: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    async fn deliver(&self, lines: &[String]) -> AttemptOutcome;
}

// =============================================================================
// Driver Chain
// =============================================================================

/// Every attempt made for one job, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: Vec<DriverAttempt>,
}

impl DeliveryReport {
    /// Name of the driver that printed the job.
    pub fn delivered_by(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|a| a.outcome.is_success())
            .map(|a| a.driver.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.delivered_by().is_some()
    }

    /// Driver name on success, the aggregated failure otherwise.
    pub fn into_result(self) -> PrintResult<String> {
        if let Some(driver) = self.delivered_by() {
            return Ok(driver.to_string());
        }

        let all_unavailable = self
            .attempts
            .iter()
            .all(|a| matches!(a.outcome, AttemptOutcome::DriverUnavailable(_)));

        if all_unavailable {
            let reason = if self.attempts.is_empty() {
                "no drivers configured".to_string()
            } else {
                self.attempts
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            Err(PrintError::TransportUnavailable(reason))
        } else {
            Err(PrintError::TransportFailed {
                attempts: self.attempts,
            })
        }
    }
}

/// Ordered list of drivers, primary first.
#[derive(Clone, Default)]
pub struct DriverChain {
    drivers: Vec<Arc<dyn PrintDriver>>,
}

impl DriverChain {
    pub fn new(drivers: Vec<Arc<dyn PrintDriver>>) -> Self {
        DriverChain { drivers }
    }

    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Tries each driver until one succeeds.
    pub async fn deliver(&self, lines: &[String]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for driver in &self.drivers {
            let outcome = driver.deliver(lines).await;

            match outcome {
                AttemptOutcome::Success => {
                    info!(driver = driver.name(), lines = lines.len(), "Print delivered");
                }
                ref failure => {
                    warn!(driver = driver.name(), outcome = %failure, "Print driver did not deliver, trying next");
                }
            }

            let done = outcome.is_success();
            report.attempts.push(DriverAttempt::new(driver.name(), outcome));
            if done {
                break;
            }
        }

        report
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
