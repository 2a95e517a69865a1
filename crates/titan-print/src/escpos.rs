//! # ESC/POS Command Bytes
//!
//! The handful of commands a text receipt needs.
//!
//! ```text
//!   ESC @          initialize (clears previous mode settings)
//!   <text> LF      one printed line
//!   ESC d n        feed n lines (clears the cutter)
//!   GS V 66 0      partial cut after feeding
//! ```
//!
//! Thermal printers in the field run a single-byte code page, so anything
//! outside printable ASCII is replaced with `?` rather than sent as UTF-8.

/// `ESC @`
pub const INIT: [u8; 2] = [0x1B, 0x40];

pub const LF: u8 = 0x0A;

/// `GS V 66 0`: feed to the cutter and partial cut.
pub const PARTIAL_CUT: [u8; 4] = [0x1D, 0x56, 66, 0];

/// Lines fed before cutting so the last printed line clears the blade.
pub const CUT_FEED_LINES: u8 = 4;

/// `ESC d n`
pub fn feed(lines: u8) -> [u8; 3] {
    [0x1B, 0x64, lines]
}

/// Encodes one text line, newline included.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut out: Vec<u8> = line
        .chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            _ => b'?',
        })
        .collect();
    out.push(LF);
    out
}

/// Bytes that finish a receipt: feed then cut.
pub fn finish() -> Vec<u8> {
    let mut out = feed(CUT_FEED_LINES).to_vec();
    out.extend_from_slice(&PARTIAL_CUT);
    out
}

/// A whole receipt as one buffer: init, every line, feed, cut.
pub fn document(lines: &[String]) -> Vec<u8> {
    let mut out = INIT.to_vec();
    for line in lines {
        out.extend(encode_line(line));
    }
    out.extend(finish());
    out
}
