//! # titan-core: Pure Logic for the Titan POS Resilience Layer
//!
//! This crate holds everything about a receipt that can be decided without
//! touching a network, a disk or a printer.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Titan POS Receipt Pipeline                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Checkout (mobile / web client)                  │   │
//! │  │        Cart ──► Payment ──► ReceiptBuilder::build()             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Receipt (immutable)                    │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ titan-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  receipt  │  │   money   │  │  format   │  │ validation│  │   │
//! │  │   │  Receipt  │  │   Money   │  │ fixed-    │  │   rules   │  │   │
//! │  │   │  Builder  │  │  PHP 9.99 │  │ width     │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Vec<String> (≤ width each)             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               titan-print (drivers, bridge, orchestrator)       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`receipt`] - Receipt model and its validating builder
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`format`] - Receipt Formatter: receipt → fixed-width printable lines
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use titan_core::format::format_receipt;
//! use titan_core::money::Money;
//! use titan_core::receipt::{PaymentMethod, Receipt};
//!
//! let receipt = Receipt::builder("R-0001")
//!     .item("Pants (Size M, Blue)", 1, Money::from_major(499))
//!     .payment(PaymentMethod::Cash, Money::from_major(500))
//!     .build()
//!     .unwrap();
//!
//! let lines = format_receipt(&receipt, 32);
//! assert!(lines.iter().all(|line| line.chars().count() <= 32));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod format;
pub mod money;
pub mod receipt;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use format::{format_receipt, ReceiptFormatter};
pub use money::Money;
pub use receipt::{PaymentMethod, Receipt, ReceiptBuilder, ReceiptLineItem, StoreMetadata};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default printable width of a 58mm thermal roll, in characters.
pub const DEFAULT_LINE_WIDTH: usize = 32;

/// Narrowest line width accepted by print configuration.
///
/// The formatter itself handles any width; anything narrower is not a real roll.
pub const MIN_LINE_WIDTH: usize = 16;

/// Currency code printed in the totals block.
pub const DEFAULT_CURRENCY: &str = "PHP";

/// Maximum line items allowed on a single receipt.
pub const MAX_RECEIPT_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;
