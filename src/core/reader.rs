//! # Packet Reader
//!
//! Sequential cursor over one framed packet.
//!
//! All integers are big-endian. Strings come in three encodings: ASCII (one
//! byte per character), UTF-16 big-endian and UTF-16 little-endian, each either
//! fixed-width (padded with NULs) or NUL-terminated.
//!
//! Reading past the end of the frame never panics: integer reads return `0`,
//! string reads return whatever characters were available, and the cursor is
//! parked at the end so every later read also yields the sentinel. Truncated or
//! malformed packets therefore degrade to default values instead of crashing.
//!
//! ```rust
//! use netstate::core::reader::PacketReader;
//!
//! let frame = [0x1C, 0x00, 0x2A, b'h', b'i', 0x00];
//! let mut reader = PacketReader::with_offset(&frame, 1);
//! assert_eq!(reader.id(), 0x1C);
//! assert_eq!(reader.read_u16(), 42);
//! assert_eq!(reader.read_ascii_null(), "hi");
//! assert_eq!(reader.read_u32(), 0);
//! ```

use std::char::REPLACEMENT_CHARACTER;

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    /// Reader positioned at the first byte of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Reader positioned `offset` bytes into `data`, used to start after a frame header
    pub fn with_offset(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            position: offset.min(data.len()),
        }
    }

    /// Packet identifier (first byte of the frame)
    pub fn id(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// Total frame length, header included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Whole frame, header included
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes not yet consumed
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    /// Move the cursor to an absolute position, clamped to the frame end
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    pub fn skip(&mut self, count: usize) {
        self.seek(self.position.saturating_add(count));
    }

    #[inline]
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        match self.data.get(self.position..self.position + N) {
            Some(bytes) => {
                self.position += N;
                let mut out = [0u8; N];
                out.copy_from_slice(bytes);
                Some(out)
            }
            None => {
                self.position = self.data.len();
                None
            }
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        self.take::<1>().map(|b| b[0]).unwrap_or(0)
    }

    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    pub fn read_u16(&mut self) -> u16 {
        self.take().map(u16::from_be_bytes).unwrap_or(0)
    }

    pub fn read_i16(&mut self) -> i16 {
        self.take().map(i16::from_be_bytes).unwrap_or(0)
    }

    pub fn read_u32(&mut self) -> u32 {
        self.take().map(u32::from_be_bytes).unwrap_or(0)
    }

    pub fn read_i32(&mut self) -> i32 {
        self.take().map(i32::from_be_bytes).unwrap_or(0)
    }

    pub fn read_u64(&mut self) -> u64 {
        self.take().map(u64::from_be_bytes).unwrap_or(0)
    }

    pub fn read_i64(&mut self) -> i64 {
        self.take().map(i64::from_be_bytes).unwrap_or(0)
    }

    /// Up to `count` raw bytes; fewer if the frame ends first
    pub fn read_bytes(&mut self, count: usize) -> &'a [u8] {
        let end = self.position.saturating_add(count).min(self.data.len());
        let bytes = &self.data[self.position..end];
        self.position = end;
        bytes
    }

    /// Fixed-width ASCII field of `length` bytes; characters after the first NUL are ignored
    pub fn read_ascii(&mut self, length: usize) -> String {
        let field = self.read_bytes(length);
        decode_ascii(until_nul(field))
    }

    /// NUL-terminated ASCII string; the terminator is consumed
    pub fn read_ascii_null(&mut self) -> String {
        let rest = self.remaining_bytes();
        let text = until_nul(rest);
        let consumed = (text.len() + 1).min(rest.len());
        self.position += consumed;
        decode_ascii(text)
    }

    /// Fixed-width UTF-16BE field of `length` characters
    pub fn read_unicode_be(&mut self, length: usize) -> String {
        let field = self.read_bytes(length.saturating_mul(2));
        decode_utf16(field, u16::from_be_bytes)
    }

    /// NUL-terminated UTF-16BE string
    pub fn read_unicode_be_null(&mut self) -> String {
        self.read_utf16_null(u16::from_be_bytes)
    }

    /// Fixed-width UTF-16LE field of `length` characters
    pub fn read_unicode_le(&mut self, length: usize) -> String {
        let field = self.read_bytes(length.saturating_mul(2));
        decode_utf16(field, u16::from_le_bytes)
    }

    /// NUL-terminated UTF-16LE string
    pub fn read_unicode_le_null(&mut self) -> String {
        self.read_utf16_null(u16::from_le_bytes)
    }

    fn read_utf16_null(&mut self, unit: fn([u8; 2]) -> u16) -> String {
        let rest = self.remaining_bytes();
        let mut end = 0;
        while end + 2 <= rest.len() && unit([rest[end], rest[end + 1]]) != 0 {
            end += 2;
        }
        // consume the terminator when present, otherwise everything left
        let consumed = if end + 2 <= rest.len() {
            end + 2
        } else {
            rest.len()
        };
        self.position += consumed;
        decode_utf16(&rest[..end], unit)
    }
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(nul) => &bytes[..nul],
        None => bytes,
    }
}

fn decode_ascii(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .take_while(|&u| u != 0);

    char::decode_utf16(units)
        .map(|c| c.unwrap_or(REPLACEMENT_CHARACTER))
        .collect()
}
