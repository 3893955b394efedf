//! # Buffer Pool
//!
//! Free-list of fixed-size byte slots shared by the receive path and the
//! message pump, so neither allocates per socket read or per framed packet.
//!
//! Every slot has exactly [`BufferPool::slot_size`] bytes. Acquiring hands out
//! exclusive ownership of one slot as a [`PooledBuffer`]; dropping it (or
//! passing it to [`BufferPool::release`]) moves the allocation back onto the
//! free list. Because release consumes the buffer, it cannot be used after it
//! has been returned, and it cannot be returned twice.
//!
//! The pool never shrinks and has no upper bound: an empty free list simply
//! allocates a fresh slot.
//!
//! ## Usage
//! ```rust
//! use netstate::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(4096, 2);
//! let mut buffer = pool.acquire();
//! buffer[0] = 0x1C;
//! assert_eq!(buffer.len(), 4096);
//! pool.release(buffer);
//! assert_eq!(pool.available(), 2);
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Default slot size, large enough for one socket read
pub const DEFAULT_SLOT_SIZE: usize = 4096;

type FreeList = Arc<Mutex<Vec<Vec<u8>>>>;

/// A pooled slot that returns itself to the pool when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: FreeList,
}

impl PooledBuffer {
    /// Length of the slot (always the pool's slot size)
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(buffer);
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("capacity", &self.buffer.len())
            .finish()
    }
}

/// Storage for one framed packet: a pooled slot when the frame fits,
/// otherwise a one-off heap allocation of exactly the frame length.
#[derive(Debug)]
pub enum FrameBuffer {
    Pooled(PooledBuffer),
    Heap(Vec<u8>),
}

impl FrameBuffer {
    pub fn is_pooled(&self) -> bool {
        matches!(self, FrameBuffer::Pooled(_))
    }
}

impl Deref for FrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            FrameBuffer::Pooled(buffer) => buffer,
            FrameBuffer::Heap(buffer) => buffer,
        }
    }
}

impl DerefMut for FrameBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            FrameBuffer::Pooled(buffer) => buffer,
            FrameBuffer::Heap(buffer) => buffer,
        }
    }
}

/// Thread-safe pool of fixed-size byte slots
pub struct BufferPool {
    free: FreeList,
    slot_size: usize,
}

impl BufferPool {
    /// Create a pool of `slot_size`-byte slots with `preallocate` slots ready
    pub fn new(slot_size: usize, preallocate: usize) -> Self {
        let mut free = Vec::with_capacity(preallocate);
        for _ in 0..preallocate {
            free.push(vec![0u8; slot_size]);
        }

        Self {
            free: Arc::new(Mutex::new(free)),
            slot_size,
        }
    }

    /// Acquire a slot from the pool (or allocate a new one if none are free)
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_else(|| vec![0u8; self.slot_size]);

        PooledBuffer {
            buffer,
            pool: self.free.clone(),
        }
    }

    /// Storage for a frame of `len` bytes, pooled when it fits in one slot
    pub fn acquire_frame(&self, len: usize) -> FrameBuffer {
        if len <= self.slot_size {
            FrameBuffer::Pooled(self.acquire())
        } else {
            FrameBuffer::Heap(vec![0u8; len])
        }
    }

    /// Return a slot to the pool. Equivalent to dropping it.
    pub fn release(&self, buffer: PooledBuffer) {
        drop(buffer);
    }

    /// Size in bytes of every slot handed out by this pool
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Get the current number of free slots
    pub fn available(&self) -> usize {
        self.free.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_SIZE, 4)
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        Self {
            free: self.free.clone(),
            slot_size: self.slot_size,
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("slot_size", &self.slot_size)
            .field("available", &self.available())
            .finish()
    }
}
