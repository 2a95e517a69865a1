//! # Receipt Formatter
//!
//! Turns a [`Receipt`] into the fixed-width lines a thermal printer prints.
//!
//! ## Layout (32 columns)
//! ```text
//! ┌────────────────────────────────┐
//! │          TITAN APPAREL         │  centered store header
//! │        12 Rizal Ave, Cebu      │
//! │--------------------------------│
//! │Receipt #                 R-0001│  label left, value right
//! │Date            2026-10-17 08:00│
//! │--------------------------------│
//! │Item                Qty    Price│  20 / 3 / 9
//! │Pants (Size M, Blue)  1   499.00│
//! │--------------------------------│
//! │Subtotal              PHP 499.00│
//! │TOTAL                 PHP 499.00│
//! │--------------------------------│
//! │Payment                     Cash│
//! │Tendered              PHP 500.00│
//! │Change                  PHP 1.00│
//! └────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - Every returned line is exactly `width` characters (padded with spaces).
//! - Nothing is truncated: text longer than its column wraps onto more lines.
//! - Amounts always carry two decimals.
//! - Pure: same receipt and width, same lines.
//!
//! Below [`STACKED_LAYOUT_WIDTH`] there is no room for three columns, so each
//! item prints its name on its own line(s) followed by `qty x price ... total`.

use crate::money::Money;
use crate::receipt::{Receipt, ReceiptLineItem};
use crate::DEFAULT_CURRENCY;

/// Narrowest width that still gets the item / qty / price table.
pub const STACKED_LAYOUT_WIDTH: usize = 24;

const QTY_COLUMN: usize = 3;
const PRICE_COLUMN: usize = 9;

// =============================================================================
// Public Entry Points
// =============================================================================

/// Formats a receipt at the given width with the default currency.
pub fn format_receipt(receipt: &Receipt, width: usize) -> Vec<String> {
    ReceiptFormatter::new(width).format(receipt)
}

/// Configurable receipt formatter.
///
/// ## Example
/// ```rust
/// use titan_core::format::ReceiptFormatter;
/// use titan_core::money::Money;
/// use titan_core::receipt::Receipt;
///
/// let receipt = Receipt::builder("R-7")
///     .item("Cap", 1, Money::from_major(150))
///     .build()
///     .unwrap();
///
/// let lines = ReceiptFormatter::new(32).currency("USD").format(&receipt);
/// assert!(lines.iter().any(|l| l.ends_with("USD 150.00")));
/// ```
#[derive(Debug, Clone)]
pub struct ReceiptFormatter {
    width: usize,
    currency: String,
}

impl ReceiptFormatter {
    pub fn new(width: usize) -> Self {
        ReceiptFormatter {
            width: width.max(1),
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Produces the printable lines for a receipt.
    pub fn format(&self, receipt: &Receipt) -> Vec<String> {
        let mut out = Vec::new();

        self.push_header(receipt, &mut out);
        self.push_separator(&mut out);
        self.push_items(receipt, &mut out);
        self.push_separator(&mut out);
        self.push_totals(receipt, &mut out);

        if receipt.payment_method().is_some() || receipt.tendered().is_some() {
            self.push_separator(&mut out);
            self.push_payment(receipt, &mut out);
        }

        if let Some(footer) = receipt.store().footer.as_deref() {
            out.push(String::new());
            self.push_centered(footer, &mut out);
        }

        fit_lines(out, self.width)
    }

    // =========================================================================
    // Sections
    // =========================================================================

    fn push_header(&self, receipt: &Receipt, out: &mut Vec<String>) {
        let store = receipt.store();

        if !store.name.trim().is_empty() {
            self.push_centered(&store.name, out);
        }
        for line in &store.address_lines {
            self.push_centered(line, out);
        }
        if let Some(phone) = store.phone.as_deref() {
            self.push_centered(&format!("Tel: {}", phone), out);
        }
        if let Some(tin) = store.tin.as_deref() {
            self.push_centered(&format!("TIN: {}", tin), out);
        }

        self.push_separator(out);
        self.push_label_value("Receipt #", receipt.receipt_number(), out);

        let created = receipt.timestamps().created_at.format("%Y-%m-%d %H:%M");
        self.push_label_value("Date", &created.to_string(), out);

        if let Some(cashier) = receipt.cashier() {
            self.push_label_value("Cashier", cashier, out);
        }
    }

    fn push_items(&self, receipt: &Receipt, out: &mut Vec<String>) {
        match ColumnLayout::for_width(self.width) {
            Some(layout) => {
                out.push(format!(
                    "{}{}{}",
                    pad_right("Item", layout.item),
                    pad_left("Qty", layout.qty),
                    pad_left("Price", layout.price)
                ));

                for item in receipt.line_items() {
                    let qty = item.quantity.to_string();
                    let total = item.line_total.format_amount();

                    if char_len(&qty) > layout.qty || char_len(&total) > layout.price {
                        self.push_stacked_item(item, out);
                        continue;
                    }

                    let chunks = wrap_text(&item.name, layout.item);
                    for (i, chunk) in chunks.iter().enumerate() {
                        let name = pad_right(chunk.trim_end(), layout.item);
                        if i == 0 {
                            out.push(format!(
                                "{}{}{}",
                                name,
                                pad_left(&qty, layout.qty),
                                pad_left(&total, layout.price)
                            ));
                        } else {
                            out.push(name);
                        }
                    }
                }
            }
            None => {
                out.push("Items".to_string());
                for item in receipt.line_items() {
                    self.push_stacked_item(item, out);
                }
            }
        }
    }

    fn push_stacked_item(&self, item: &ReceiptLineItem, out: &mut Vec<String>) {
        for chunk in wrap_text(&item.name, self.width) {
            out.push(chunk.trim_end().to_string());
        }
        let detail = format!("  {} x {}", item.quantity, item.unit_price.format_amount());
        self.push_label_value(&detail, &item.line_total.format_amount(), out);
    }

    fn push_totals(&self, receipt: &Receipt, out: &mut Vec<String>) {
        self.push_label_value("Subtotal", &self.money(receipt.subtotal()), out);

        if !receipt.discount().is_zero() {
            let discount = format!("-{}", self.money(receipt.discount()));
            self.push_label_value("Discount", &discount, out);
        }

        self.push_label_value("TOTAL", &self.money(receipt.total()), out);
    }

    fn push_payment(&self, receipt: &Receipt, out: &mut Vec<String>) {
        if let Some(method) = receipt.payment_method() {
            self.push_label_value("Payment", &method.to_string(), out);
        }
        if let Some(tendered) = receipt.tendered() {
            self.push_label_value("Tendered", &self.money(tendered), out);
        }
        if let Some(change) = receipt.change() {
            self.push_label_value("Change", &self.money(change), out);
        }
    }

    // =========================================================================
    // Line Helpers
    // =========================================================================

    fn money(&self, amount: Money) -> String {
        amount.with_currency(&self.currency)
    }

    fn push_separator(&self, out: &mut Vec<String>) {
        out.push("-".repeat(self.width));
    }

    fn push_centered(&self, text: &str, out: &mut Vec<String>) {
        for chunk in wrap_text(text.trim(), self.width) {
            out.push(center(chunk.trim_end(), self.width));
        }
    }

    /// Label on the left, value right-aligned. Falls back to two lines when
    /// both do not fit with at least one space between them.
    fn push_label_value(&self, label: &str, value: &str, out: &mut Vec<String>) {
        let used = char_len(label) + char_len(value);

        if used < self.width {
            let gap = self.width - used;
            out.push(format!("{}{}{}", label, " ".repeat(gap), value));
        } else {
            out.push(label.to_string());
            out.push(pad_left(value, self.width));
        }
    }
}

// =============================================================================
// Column Layout
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnLayout {
    item: usize,
    qty: usize,
    price: usize,
}

impl ColumnLayout {
    fn for_width(width: usize) -> Option<Self> {
        if width < STACKED_LAYOUT_WIDTH {
            return None;
        }
        Some(ColumnLayout {
            item: width - QTY_COLUMN - PRICE_COLUMN,
            qty: QTY_COLUMN,
            price: PRICE_COLUMN,
        })
    }
}

// =============================================================================
// Text Wrapping
// =============================================================================

/// Splits text into chunks whose visible part (ignoring trailing spaces) is
/// at most `width` characters.
///
/// Breaks at whitespace when possible and hard-splits words longer than the
/// width. Concatenating the chunks yields the input unchanged.
///
/// ## Example
/// ```rust
/// use titan_core::format::wrap_text;
///
/// let chunks = wrap_text("Pants (Size M, Blue)", 10);
/// assert_eq!(chunks, vec!["Pants ", "(Size M, ", "Blue)"]);
/// assert_eq!(chunks.concat(), "Pants (Size M, Blue)");
/// ```
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);

    if char_len(text) <= width {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_inclusive(char::is_whitespace) {
        let word_len = char_len(word);
        let visible = word.trim_end();
        let visible_len = char_len(visible);

        if visible_len == 0 || current_len + visible_len <= width {
            current.push_str(word);
            current_len += word_len;
            continue;
        }

        if current_len > 0 {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if visible_len <= width {
            current.push_str(word);
            current_len = word_len;
            continue;
        }

        // Word longer than a whole line: hard split, keep the tail open.
        let chars: Vec<char> = visible.chars().collect();
        let mut pieces = chars.chunks(width).peekable();
        while let Some(piece) = pieces.next() {
            let piece: String = piece.iter().collect();
            if pieces.peek().is_some() {
                chunks.push(piece);
            } else {
                current_len = char_len(&piece) + (word_len - visible_len);
                current = piece;
                current.push_str(&word[visible.len()..]);
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Final pass: re-wraps anything still too long and pads to exactly `width`.
fn fit_lines(lines: Vec<String>, width: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());

    for line in lines {
        if char_len(&line) <= width {
            out.push(pad_right(&line, width));
        } else {
            for chunk in wrap_text(&line, width) {
                out.push(pad_right(chunk.trim_end(), width));
            }
        }
    }

    out
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn pad_right(text: &str, width: usize) -> String {
    let len = char_len(text);
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", text, " ".repeat(width - len))
}

fn pad_left(text: &str, width: usize) -> String {
    let len = char_len(text);
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", " ".repeat(width - len), text)
}

fn center(text: &str, width: usize) -> String {
    let len = char_len(text);
    if len >= width {
        return text.to_string();
    }
    let left = (width - len) / 2;
    pad_right(&format!("{}{}", " ".repeat(left), text), width)
}

// =============================================================================
// Unit Tests
// =============================================================================
