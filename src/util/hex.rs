//! Hex formatting for word-oriented evio data.
//!
//! Evio structures are built from 32-bit words, so the dump helpers here are
//! word-granular rather than the byte-per-column form used for arbitrary
//! binary files.

use crate::buffer::Endian;

/// Format a u32 value as hex with 0x prefix.
pub fn format_hex32(value: u32) -> String {
    format!("0x{:08x}", value)
}

/// Format bytes as a compact hex string (e.g., "4a2f00ff").
pub fn format_bytes(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Dump a byte region as 32-bit words in the given order, four words per
/// line with a word-offset column:
///
/// ```text
/// 0000  0x00000016 0x000b0e01 0x00000004 0x000b0201
/// ```
///
/// A trailing partial word is appended as raw hex bytes.
pub fn word_dump(data: &[u8], order: Endian) -> String {
    let mut lines = Vec::new();
    let words = data.len() / 4;

    for line_start in (0..words).step_by(4) {
        let mut line = format!("{:04x} ", line_start);
        for w in line_start..(line_start + 4).min(words) {
            let b = &data[w * 4..w * 4 + 4];
            let value = match order {
                Endian::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
                Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            };
            line.push(' ');
            line.push_str(&format_hex32(value));
        }
        lines.push(line);
    }

    let tail = &data[words * 4..];
    if !tail.is_empty() {
        lines.push(format!("{:04x}  {}", words, format_bytes(tail)));
    }
    lines.join("\n")
}
