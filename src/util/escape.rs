//! Printable forms of byte strings for descriptions.

use std::fmt::Write;

/// Render `bytes` for a description string.
///
/// Valid UTF-8 passes through unchanged. Bytes which are not part of a valid
/// UTF-8 sequence are written as `\xHH`.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
        for byte in chunk.invalid() {
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
    out
}
