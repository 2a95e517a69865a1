//! # Validation Module
//!
//! Input validation utilities for receipt construction and print settings.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Where Validation Happens                            │
//! │                                                                         │
//! │  ReceiptBuilder::build()                                               │
//! │       │                                                                 │
//! │       ├── validate_receipt_number()   non-empty, ≤ 40 chars            │
//! │       ├── validate_item_name()        non-empty, printable             │
//! │       ├── validate_quantity()         1..=999                           │
//! │       └── validate_non_negative()     prices, discount                 │
//! │                                                                         │
//! │  PrintConfig::validate()                                               │
//! │       └── validate_line_width()       ≥ MIN_LINE_WIDTH                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_ITEM_QUANTITY, MIN_LINE_WIDTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest receipt number the header layout accepts.
const MAX_RECEIPT_NUMBER_LEN: usize = 40;

/// Longest product name accepted on a line item.
const MAX_ITEM_NAME_LEN: usize = 200;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a receipt number.
///
/// ## Example
/// ```rust
/// use titan_core::validation::validate_receipt_number;
///
/// assert!(validate_receipt_number("R-0001").is_ok());
/// assert!(validate_receipt_number("").is_err());
/// ```
pub fn validate_receipt_number(number: &str) -> ValidationResult<()> {
    let number = number.trim();

    if number.is_empty() {
        return Err(ValidationError::Required {
            field: "receipt_number".to_string(),
        });
    }

    if number.chars().count() > MAX_RECEIPT_NUMBER_LEN {
        return Err(ValidationError::TooLong {
            field: "receipt_number".to_string(),
            max: MAX_RECEIPT_NUMBER_LEN,
        });
    }

    ensure_printable("receipt_number", number)
}

/// Validates a line item name.
///
/// Long names are fine (the formatter wraps them); control characters are
/// not, since they would reach the printer as commands.
pub fn validate_item_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_ITEM_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_ITEM_NAME_LEN,
        });
    }

    ensure_printable("name", name)
}

fn ensure_printable(field: &str, value: &str) -> ValidationResult<()> {
    if value.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates that an amount is zero or positive.
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a printer line width.
pub fn validate_line_width(width: usize) -> ValidationResult<()> {
    if width < MIN_LINE_WIDTH {
        return Err(ValidationError::OutOfRange {
            field: "line_width".to_string(),
            min: MIN_LINE_WIDTH as i64,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_number() {
        assert!(validate_receipt_number("R-0001").is_ok());
        assert!(validate_receipt_number("   ").is_err());
        assert!(validate_receipt_number(&"9".repeat(41)).is_err());
        assert!(validate_receipt_number("R\u{1b}1").is_err());
    }

    #[test]
    fn test_item_name() {
        assert!(validate_item_name("Pants (Size M, Blue)").is_ok());
        assert!(validate_item_name("").is_err());
        assert!(validate_item_name("Bad\nName").is_err());
    }

    #[test]
    fn test_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_non_negative() {
        assert!(validate_non_negative("discount", Money::zero()).is_ok());
        assert!(validate_non_negative("discount", Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_line_width() {
        assert!(validate_line_width(32).is_ok());
        assert!(validate_line_width(16).is_ok());
        assert!(validate_line_width(15).is_err());
    }
}
