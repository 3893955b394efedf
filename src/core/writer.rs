//! # Packet Writer
//!
//! Growable big-endian encoder for outbound packets, plus a pool of reusable
//! writers so high send rates do not allocate a fresh buffer per packet.
//!
//! Fixed-width string writes always emit exactly the declared width: longer
//! values are truncated, shorter values are NUL-padded. NUL-terminated writes
//! emit the value followed by one terminator.
//!
//! ```rust
//! use netstate::core::writer::PacketWriter;
//!
//! let mut writer = PacketWriter::with_capacity(8);
//! writer.write_ascii("abcdef", 5);
//! assert_eq!(writer.as_slice(), b"abcde");
//! ```

use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};

/// Character substituted for anything outside 7-bit ASCII
const ASCII_SUBSTITUTE: u8 = b'?';

#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop all written bytes and make sure at least `capacity` bytes are reserved
    pub fn reset(&mut self, capacity: usize) {
        self.buffer.clear();
        self.buffer.reserve(capacity);
    }

    /// Hand the written bytes out and leave the writer empty for reuse
    pub fn take_bytes(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buffer.put_i8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.put_u8(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buffer.put_i16(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.put_u64(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.put_i64(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.buffer.put_bytes(0, count);
    }

    /// Overwrite a big-endian u16 at an absolute position already written
    pub fn patch_u16(&mut self, position: usize, value: u16) {
        if let Some(slot) = self.buffer.get_mut(position..position + 2) {
            slot.copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Pad with zero bytes until the writer holds `capacity` bytes
    pub fn fill(&mut self, capacity: usize) {
        if self.buffer.len() < capacity {
            let missing = capacity - self.buffer.len();
            self.write_zeros(missing);
        }
    }

    /// ASCII field of exactly `width` bytes
    pub fn write_ascii(&mut self, value: &str, width: usize) {
        let mut written = 0;
        for byte in ascii_bytes(value).take(width) {
            self.buffer.put_u8(byte);
            written += 1;
        }
        self.write_zeros(width - written);
    }

    /// ASCII string followed by a NUL terminator
    pub fn write_ascii_null(&mut self, value: &str) {
        for byte in ascii_bytes(value) {
            self.buffer.put_u8(byte);
        }
        self.buffer.put_u8(0);
    }

    /// UTF-16BE field of exactly `width` code units
    pub fn write_unicode_be(&mut self, value: &str, width: usize) {
        self.write_utf16_fixed(value, width, u16::to_be_bytes);
    }

    /// UTF-16BE string followed by a two-byte NUL terminator
    pub fn write_unicode_be_null(&mut self, value: &str) {
        self.write_utf16_null(value, u16::to_be_bytes);
    }

    /// UTF-16LE field of exactly `width` code units
    pub fn write_unicode_le(&mut self, value: &str, width: usize) {
        self.write_utf16_fixed(value, width, u16::to_le_bytes);
    }

    /// UTF-16LE string followed by a two-byte NUL terminator
    pub fn write_unicode_le_null(&mut self, value: &str) {
        self.write_utf16_null(value, u16::to_le_bytes);
    }

    fn write_utf16_fixed(&mut self, value: &str, width: usize, bytes: fn(u16) -> [u8; 2]) {
        let mut written = 0;
        for unit in value.encode_utf16().take(width) {
            self.buffer.extend_from_slice(&bytes(unit));
            written += 1;
        }
        self.write_zeros((width - written) * 2);
    }

    fn write_utf16_null(&mut self, value: &str, bytes: fn(u16) -> [u8; 2]) {
        for unit in value.encode_utf16() {
            self.buffer.extend_from_slice(&bytes(unit));
        }
        self.write_zeros(2);
    }
}

fn ascii_bytes(value: &str) -> impl Iterator<Item = u8> + '_ {
    value.chars().map(|c| {
        if c.is_ascii() {
            c as u8
        } else {
            ASCII_SUBSTITUTE
        }
    })
}

/// Pool of reusable packet writers.
///
/// `acquire` hands out an owned, empty writer; `release` takes it back by
/// value. A writer that has been released cannot still be referenced by the
/// caller, and every acquired writer starts empty regardless of what its
/// previous user left behind.
pub struct WriterPool {
    free: Arc<Mutex<Vec<PacketWriter>>>,
    max_retained: usize,
}

impl WriterPool {
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Arc::new(Mutex::new(Vec::with_capacity(max_retained))),
            max_retained,
        }
    }

    /// An empty writer with at least `capacity` bytes reserved
    pub fn acquire(&self, capacity: usize) -> PacketWriter {
        let writer = self.free.lock().ok().and_then(|mut free| free.pop());

        match writer {
            Some(mut writer) => {
                writer.reset(capacity);
                writer
            }
            None => PacketWriter::with_capacity(capacity),
        }
    }

    /// Return a writer to the pool; dropped instead when the pool is full
    pub fn release(&self, mut writer: PacketWriter) {
        writer.buffer.clear();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.max_retained {
                free.push(writer);
            }
        }
    }

    /// Writers currently waiting for reuse
    pub fn available(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }
}

impl Default for WriterPool {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Clone for WriterPool {
    fn clone(&self) -> Self {
        Self {
            free: self.free.clone(),
            max_retained: self.max_retained,
        }
    }
}

impl std::fmt::Debug for WriterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterPool")
            .field("max_retained", &self.max_retained)
            .field("available", &self.available())
            .finish()
    }
}
