//! # Receipt Model
//!
//! The receipt is built exactly once per transaction and never mutated
//! afterwards. Printing, reprinting from history and the file fallback all
//! read the same frozen value.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Receipt Lifecycle                               │
//! │                                                                         │
//! │  Payment accepted                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Receipt::builder("R-0001")                                            │
//! │       .store(..) .item(..) .discount(..) .payment(..)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  build() ──► validates + computes subtotal / total / change            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Receipt (read-only accessors, serde for the bridge wire format)       │
//! │       │                                                                 │
//! │       ├──► format_receipt(&receipt, 32) ──► printable lines             │
//! │       └──► POST /api/print/receipt { receiptData: Receipt }             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation::{
    validate_item_name, validate_non_negative, validate_quantity, validate_receipt_number,
};
use crate::{MAX_ITEM_QUANTITY, MAX_RECEIPT_ITEMS};

// =============================================================================
// Store Metadata
// =============================================================================

/// Store details printed in the receipt header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StoreMetadata {
    /// Trading name, centered at the top of the receipt.
    pub name: String,

    /// Address lines, printed in order.
    #[serde(default)]
    pub address_lines: Vec<String>,

    /// Contact number.
    #[serde(default)]
    pub phone: Option<String>,

    /// Tax identification number.
    #[serde(default)]
    pub tin: Option<String>,

    /// Closing message (e.g. "Thank you for shopping!").
    #[serde(default)]
    pub footer: Option<String>,
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// Mobile wallet transfer.
    EWallet,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "Cash"),
            PaymentMethod::Card => write!(f, "Card"),
            PaymentMethod::EWallet => write!(f, "E-Wallet"),
        }
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// A line on the receipt. Product data is frozen at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReceiptLineItem {
    /// Product name at time of sale.
    pub name: String,
    /// Quantity sold.
    pub quantity: i64,
    /// Unit price at time of sale.
    pub unit_price: Money,
    /// unit_price × quantity.
    pub line_total: Money,
}

impl ReceiptLineItem {
    /// Creates a line item, computing the line total.
    pub fn new(name: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        ReceiptLineItem {
            name: name.into(),
            quantity,
            unit_price,
            line_total: unit_price.multiply_quantity(quantity),
        }
    }
}

// =============================================================================
// Timestamps
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReceiptTimestamps {
    /// When the transaction was created.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When payment was accepted, if different from creation.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Receipt
// =============================================================================

/// A finalized receipt.
///
/// Fields are private: the only ways to obtain one are [`ReceiptBuilder`]
/// and deserializing a receipt someone else built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Receipt {
    receipt_number: String,
    #[serde(default)]
    store: StoreMetadata,
    #[serde(alias = "items")]
    line_items: Vec<ReceiptLineItem>,
    #[serde(default)]
    payment_method: Option<PaymentMethod>,
    subtotal: Money,
    #[serde(default)]
    discount: Money,
    total: Money,
    #[serde(default)]
    tendered: Option<Money>,
    #[serde(default)]
    change: Option<Money>,
    #[serde(default)]
    cashier: Option<String>,
    timestamps: ReceiptTimestamps,
}

impl Receipt {
    /// Starts building a receipt with the given receipt number.
    pub fn builder(receipt_number: impl Into<String>) -> ReceiptBuilder {
        ReceiptBuilder::new(receipt_number)
    }

    pub fn receipt_number(&self) -> &str {
        &self.receipt_number
    }

    pub fn store(&self) -> &StoreMetadata {
        &self.store
    }

    pub fn line_items(&self) -> &[ReceiptLineItem] {
        &self.line_items
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn tendered(&self) -> Option<Money> {
        self.tendered
    }

    pub fn change(&self) -> Option<Money> {
        self.change
    }

    pub fn cashier(&self) -> Option<&str> {
        self.cashier.as_deref()
    }

    pub fn timestamps(&self) -> &ReceiptTimestamps {
        &self.timestamps
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> i64 {
        self.line_items.iter().map(|item| item.quantity).sum()
    }
}

// =============================================================================
// Receipt Builder
// =============================================================================

/// Collects checkout data and produces a validated [`Receipt`].
///
/// ## Example
/// ```rust
/// use titan_core::money::Money;
/// use titan_core::receipt::{PaymentMethod, Receipt};
///
/// let receipt = Receipt::builder("R-0042")
///     .item("Coffee", 2, Money::from_major(120))
///     .discount(Money::from_major(40))
///     .payment(PaymentMethod::Cash, Money::from_major(500))
///     .build()
///     .unwrap();
///
/// assert_eq!(receipt.subtotal(), Money::from_major(240));
/// assert_eq!(receipt.total(), Money::from_major(200));
/// assert_eq!(receipt.change(), Some(Money::from_major(300)));
/// ```
#[derive(Debug, Clone)]
pub struct ReceiptBuilder {
    receipt_number: String,
    store: StoreMetadata,
    items: Vec<ReceiptLineItem>,
    discount: Money,
    payment_method: Option<PaymentMethod>,
    tendered: Option<Money>,
    cashier: Option<String>,
    created_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
}

impl ReceiptBuilder {
    fn new(receipt_number: impl Into<String>) -> Self {
        ReceiptBuilder {
            receipt_number: receipt_number.into(),
            store: StoreMetadata::default(),
            items: Vec::new(),
            discount: Money::zero(),
            payment_method: None,
            tendered: None,
            cashier: None,
            created_at: None,
            paid_at: None,
        }
    }

    pub fn store(mut self, store: StoreMetadata) -> Self {
        self.store = store;
        self
    }

    pub fn item(mut self, name: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        self.items.push(ReceiptLineItem::new(name, quantity, unit_price));
        self
    }

    pub fn discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    /// Records a payment with the amount handed over by the customer.
    pub fn payment(mut self, method: PaymentMethod, tendered: Money) -> Self {
        self.payment_method = Some(method);
        self.tendered = Some(tendered);
        self
    }

    /// Records a payment for exactly the total (card, e-wallet).
    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self.tendered = None;
        self
    }

    pub fn cashier(mut self, cashier: impl Into<String>) -> Self {
        self.cashier = Some(cashier.into());
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn paid_at(mut self, at: DateTime<Utc>) -> Self {
        self.paid_at = Some(at);
        self
    }

    /// Validates the collected data and freezes it into a [`Receipt`].
    pub fn build(self) -> CoreResult<Receipt> {
        validate_receipt_number(&self.receipt_number)?;

        if self.items.is_empty() {
            return Err(CoreError::EmptyReceipt {
                receipt_number: self.receipt_number,
            });
        }

        if self.items.len() > MAX_RECEIPT_ITEMS {
            return Err(CoreError::TooManyItems {
                max: MAX_RECEIPT_ITEMS,
            });
        }

        for item in &self.items {
            validate_item_name(&item.name)?;
            if item.quantity > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: item.quantity,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            validate_quantity(item.quantity)?;
            validate_non_negative("unit_price", item.unit_price)?;
        }

        let subtotal: Money = self.items.iter().map(|item| item.line_total).sum();

        validate_non_negative("discount", self.discount)?;
        if self.discount > subtotal {
            return Err(CoreError::DiscountExceedsSubtotal {
                discount: self.discount.format_amount(),
                subtotal: subtotal.format_amount(),
            });
        }

        let total = subtotal - self.discount;

        let change = match self.tendered {
            Some(tendered) if tendered < total => {
                return Err(CoreError::InvalidPaymentAmount {
                    reason: format!(
                        "tendered {} is less than total {}",
                        tendered.format_amount(),
                        total.format_amount()
                    ),
                });
            }
            Some(tendered) => Some(tendered - total),
            None => None,
        };

        Ok(Receipt {
            receipt_number: self.receipt_number.trim().to_string(),
            store: self.store,
            line_items: self.items,
            payment_method: self.payment_method,
            subtotal,
            discount: self.discount,
            total,
            tendered: self.tendered,
            change,
            cashier: self.cashier,
            timestamps: ReceiptTimestamps {
                created_at: self.created_at.unwrap_or_else(Utc::now),
                paid_at: self.paid_at,
            },
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn pants() -> ReceiptBuilder {
        Receipt::builder("R-0001").item("Pants (Size M, Blue)", 1, Money::from_major(499))
    }

    #[test]
    fn test_build_computes_totals() {
        let receipt = pants()
            .item("Socks", 3, Money::from_major(50))
            .discount(Money::from_major(49))
            .payment(PaymentMethod::Cash, Money::from_major(1000))
            .build()
            .unwrap();

        assert_eq!(receipt.subtotal(), Money::from_major(649));
        assert_eq!(receipt.total(), Money::from_major(600));
        assert_eq!(receipt.change(), Some(Money::from_major(400)));
        assert_eq!(receipt.item_count(), 4);
    }

    #[test]
    fn test_card_payment_has_no_change() {
        let receipt = pants().payment_method(PaymentMethod::Card).build().unwrap();
        assert_eq!(receipt.tendered(), None);
        assert_eq!(receipt.change(), None);
        assert_eq!(receipt.payment_method(), Some(PaymentMethod::Card));
    }

    #[test]
    fn test_empty_receipt_rejected() {
        let err = Receipt::builder("R-0001").build().unwrap_err();
        assert!(matches!(err, CoreError::EmptyReceipt { .. }));
    }

    #[test]
    fn test_missing_receipt_number_rejected() {
        let err = Receipt::builder("  ")
            .item("Socks", 1, Money::from_major(50))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_quantity_limits() {
        let err = Receipt::builder("R-1")
            .item("Socks", 1000, Money::from_major(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { .. }));

        let err = Receipt::builder("R-1")
            .item("Socks", 0, Money::from_major(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_discount_larger_than_subtotal_rejected() {
        let err = pants().discount(Money::from_major(500)).build().unwrap_err();
        assert!(matches!(err, CoreError::DiscountExceedsSubtotal { .. }));
    }

    #[test]
    fn test_insufficient_tender_rejected() {
        let err = pants()
            .payment(PaymentMethod::Cash, Money::from_major(100))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPaymentAmount { .. }));
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let receipt = pants().build().unwrap();
        let json = serde_json::to_value(&receipt).unwrap();

        assert_eq!(json["receiptNumber"], "R-0001");
        assert_eq!(json["lineItems"][0]["unitPrice"], 49900);
        assert!(json["timestamps"]["createdAt"].is_string());

        let back: Receipt = serde_json::from_value(json).unwrap();
        assert_eq!(back, receipt);
    }

    #[test]
    fn test_deserialize_accepts_items_alias_and_defaults() {
        let json = serde_json::json!({
            "receiptNumber": "R-9",
            "items": [{ "name": "Pants", "quantity": 1, "unitPrice": 49900, "lineTotal": 49900 }],
            "subtotal": 49900,
            "total": 49900,
            "timestamps": { "createdAt": "2026-10-17T08:00:00Z" }
        });

        let receipt: Receipt = serde_json::from_value(json).unwrap();
        assert_eq!(receipt.line_items().len(), 1);
        assert_eq!(receipt.discount(), Money::zero());
        assert_eq!(receipt.payment_method(), None);
    }
}
