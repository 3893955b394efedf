//! Diagnostic dumps for frames nobody can decode.
//!
//! Used when an identifier has no handler: the bytes are logged as a hex dump
//! so the protocol mismatch can be investigated. Nothing is retried.

use std::fmt::Write;

use tracing::warn;

const BYTES_PER_LINE: usize = 16;

/// Longest dump written to the log; the rest is summarized
pub const MAX_DUMP_BYTES: usize = 1024;

/// Render `bytes` as offset / hex / printable-ASCII lines
pub fn hex_dump(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(MAX_DUMP_BYTES)];
    let mut out = String::with_capacity(shown.len() * 4);

    for (line, chunk) in shown.chunks(BYTES_PER_LINE).enumerate() {
        let printable: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();

        let _ = writeln!(
            out,
            "{:04x}  {:<width$}  |{}|",
            line * BYTES_PER_LINE,
            hex::encode(chunk),
            printable,
            width = BYTES_PER_LINE * 2
        );
    }

    if bytes.len() > shown.len() {
        let _ = writeln!(out, "... {} more bytes", bytes.len() - shown.len());
    }

    out
}

/// Report bytes drained because their leading identifier has no handler
pub fn unknown_packet(id: u8, drained: &[u8]) {
    warn!(
        id = format_args!("{id:#04x}"),
        bytes = drained.len(),
        "Unknown packet identifier, discarding buffered bytes\n{}",
        hex_dump(drained)
    );
}

/// Report an extension frame whose two-byte identifier has no handler
pub fn unknown_extended(carrier: u8, id: u16, frame: &[u8]) {
    warn!(
        carrier = format_args!("{carrier:#04x}"),
        id = format_args!("{id:#06x}"),
        bytes = frame.len(),
        "Unknown extended packet identifier, skipping frame\n{}",
        hex_dump(frame)
    );
}

/// Report an extension frame too short to carry its two-byte identifier
pub fn truncated_extended(carrier: u8, frame: &[u8]) {
    warn!(
        carrier = format_args!("{carrier:#04x}"),
        bytes = frame.len(),
        "Extension frame without extended identifier, skipping frame\n{}",
        hex_dump(frame)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_has_offsets_hex_and_ascii() {
        let dump = hex_dump(b"ABC\x00\x01");
        assert!(dump.starts_with("0000  4142430001"));
        assert!(dump.trim_end().ends_with("|ABC..|"));
    }

    #[test]
    fn dump_wraps_every_sixteen_bytes() {
        let bytes: Vec<u8> = (0u8..40).collect();
        let dump = hex_dump(&bytes);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0010  101112"));
        assert!(lines[2].starts_with("0020  2021"));
    }

    #[test]
    fn dump_is_capped() {
        let bytes = vec![0xEEu8; MAX_DUMP_BYTES + 10];
        let dump = hex_dump(&bytes);
        assert!(dump.ends_with("... 10 more bytes\n"));
    }

    #[test]
    fn empty_dump() {
        assert!(hex_dump(&[]).is_empty());
    }
}
