//! # Send Queue
//!
//! Outbound grams waiting for the socket.
//!
//! At most one transmission is in flight at a time. When the socket is ready
//! again, [`SendQueue::check_flush_ready`] merges as many queued grams as fit
//! in `coalesce_limit` bytes into one transmission, so bursts of small packets
//! become a single write. Merging never reorders bytes.
//!
//! Every gram carries a token, typically the packet whose completion callback
//! must run once its bytes are written. Tokens travel with their bytes through
//! merging and come back out in the [`Transmission`], or from
//! [`SendQueue::clear`] for grams that never left.
//!
//! The queue refuses to grow past `capacity` pending bytes. A refused enqueue
//! leaves earlier grams untouched and hands the token back; the owning
//! connection treats it as fatal.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::error::ProtocolError;

/// Default ceiling on pending bytes
pub const DEFAULT_SEND_CAPACITY: usize = 256 * 1024;

/// Default upper bound for one merged transmission
pub const DEFAULT_COALESCE_LIMIT: usize = 8 * 1024;

#[derive(Debug)]
struct Gram<T> {
    bytes: Bytes,
    /// One token per enqueued gram merged into this one, in send order
    tokens: Vec<T>,
}

/// One socket write handed out by [`SendQueue::dequeue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission<T> {
    pub bytes: Bytes,
    pub tokens: Vec<T>,
}

impl<T> Transmission<T> {
    /// How many enqueued grams this write carries
    pub fn grams(&self) -> usize {
        self.tokens.len()
    }
}

/// An enqueue the ceiling refused
#[derive(Debug)]
pub struct Rejected<T> {
    pub error: ProtocolError,
    pub token: T,
}

#[derive(Debug)]
pub struct SendQueue<T> {
    grams: VecDeque<Gram<T>>,
    pending: usize,
    capacity: usize,
    coalesce_limit: usize,
    in_flight: bool,
}

impl<T> SendQueue<T> {
    pub fn new(capacity: usize, coalesce_limit: usize) -> Self {
        Self {
            grams: VecDeque::new(),
            pending: 0,
            capacity,
            coalesce_limit,
            in_flight: false,
        }
    }

    /// Queue a gram behind everything already pending.
    ///
    /// # Errors
    /// [`ProtocolError::SendCapacityExceeded`] when the gram would push the
    /// pending total past the ceiling. The token is returned untouched.
    pub fn enqueue(&mut self, gram: Bytes, token: T) -> Result<(), Rejected<T>> {
        if self.pending + gram.len() > self.capacity {
            return Err(Rejected {
                error: ProtocolError::SendCapacityExceeded {
                    pending: self.pending,
                    attempted: gram.len(),
                    limit: self.capacity,
                },
                token,
            });
        }

        self.pending += gram.len();
        self.grams.push_back(Gram {
            bytes: gram,
            tokens: vec![token],
        });
        Ok(())
    }

    /// True when nothing is in flight and there is something to send
    pub fn is_flush_ready(&self) -> bool {
        !self.in_flight && !self.grams.is_empty()
    }

    /// Merge the head grams up to the coalesce limit and report flush readiness
    pub fn check_flush_ready(&mut self) -> bool {
        if !self.is_flush_ready() {
            return false;
        }

        let mut merge = 0;
        let mut size = 0;
        for gram in &self.grams {
            if merge > 0 && size + gram.bytes.len() > self.coalesce_limit {
                break;
            }
            size += gram.bytes.len();
            merge += 1;
        }

        if merge > 1 {
            let mut merged = BytesMut::with_capacity(size);
            let mut tokens = Vec::new();
            for gram in self.grams.drain(..merge) {
                merged.extend_from_slice(&gram.bytes);
                tokens.extend(gram.tokens);
            }
            self.grams.push_front(Gram {
                bytes: merged.freeze(),
                tokens,
            });
        }

        true
    }

    /// Take the next transmission and mark it in flight until [`SendQueue::complete`]
    pub fn dequeue(&mut self) -> Option<Transmission<T>> {
        if self.in_flight {
            return None;
        }

        let gram = self.grams.pop_front()?;
        self.pending -= gram.bytes.len();
        self.in_flight = true;

        Some(Transmission {
            bytes: gram.bytes,
            tokens: gram.tokens,
        })
    }

    /// The in-flight transmission finished; the next one may be dequeued
    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    /// Bytes queued and not yet dequeued
    pub fn pending_bytes(&self) -> usize {
        self.pending
    }

    /// Queued grams (merged grams count once)
    pub fn len(&self) -> usize {
        self.grams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grams.is_empty()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything queued and return the tokens of grams never dequeued
    pub fn clear(&mut self) -> Vec<T> {
        self.pending = 0;
        self.in_flight = false;
        self.grams.drain(..).flat_map(|gram| gram.tokens).collect()
    }
}

impl<T> Default for SendQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_CAPACITY, DEFAULT_COALESCE_LIMIT)
    }
}
