//! Unframed receive bytes.
//!
//! Bytes are appended at the tail as the socket delivers them and removed from
//! the head as the message pump frames them. The peek helpers let the pump look
//! at a frame header before it knows whether the whole frame has arrived.
//! Nothing here ever waits: short reads return what is available.

use bytes::{Buf, Bytes, BytesMut};

const INITIAL_CAPACITY: usize = 0x10000;

#[derive(Debug)]
pub struct ByteQueue {
    buffer: BytesMut,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of unread bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append bytes at the tail. Growth is unbounded.
    pub fn enqueue(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Move up to `destination.len()` bytes from the head into `destination`.
    /// Returns how many bytes were actually copied.
    pub fn dequeue(&mut self, destination: &mut [u8]) -> usize {
        let count = destination.len().min(self.buffer.len());
        self.buffer.copy_to_slice(&mut destination[..count]);
        count
    }

    /// Remove and return every buffered byte.
    pub fn drain(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Discard up to `count` bytes from the head. Returns how many were discarded.
    pub fn skip(&mut self, count: usize) -> usize {
        let count = count.min(self.buffer.len());
        self.buffer.advance(count);
        count
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// First byte, without consuming it
    #[inline]
    pub fn peek_u8(&self) -> Option<u8> {
        self.buffer.first().copied()
    }

    /// Big-endian u16 starting `offset` bytes from the head, without consuming it
    #[inline]
    pub fn peek_u16_be(&self, offset: usize) -> Option<u16> {
        let bytes = self.buffer.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Copy up to `destination.len()` bytes from the head without consuming them.
    pub fn peek(&self, destination: &mut [u8]) -> usize {
        let count = destination.len().min(self.buffer.len());
        destination[..count].copy_from_slice(&self.buffer[..count]);
        count
    }
}

impl Default for ByteQueue {
    fn default() -> Self {
        Self::new()
    }
}
