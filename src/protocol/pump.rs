//! # Message Pump
//!
//! Turns the unframed bytes of a [`ByteQueue`] into dispatched packets.
//!
//! ## Framing
//! ```text
//! fixed:    [id(1)] [payload]                 total = declared length
//! dynamic:  [id(1)] [total(2, BE)] [payload]  total >= 3
//! extended: carrier frame whose payload starts with [ext id(2, BE)]
//! ```
//!
//! One call frames and dispatches every complete frame currently buffered, in
//! arrival order, and leaves a trailing partial frame in the queue for the next
//! call. It never waits for more bytes.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::byte_queue::ByteQueue;
use crate::core::packet::{PacketLength, DYNAMIC_HEADER_LEN};
use crate::core::reader::PacketReader;
use crate::error::{ProtocolError, Result};
use crate::protocol::handlers::{PacketHandler, PacketHandlers, Route};
use crate::protocol::trace as diagnostics;
use crate::utils::buffer_pool::BufferPool;
use crate::utils::metrics::Metrics;

#[derive(Clone)]
pub struct MessagePump {
    handlers: Arc<PacketHandlers>,
    buffers: BufferPool,
    metrics: Arc<Metrics>,
}

impl MessagePump {
    pub fn new(handlers: Arc<PacketHandlers>, buffers: BufferPool) -> Self {
        Self {
            handlers,
            buffers,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn handlers(&self) -> &Arc<PacketHandlers> {
        &self.handlers
    }

    /// Dispatch every complete frame in `queue`. Returns the number of frames consumed.
    pub fn pump(&self, queue: &mut ByteQueue) -> Result<usize> {
        self.pump_while(queue, || true)
    }

    /// Like [`MessagePump::pump`], but checks `is_active` before each frame and
    /// stops as soon as it returns false.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownPacket`] when the next identifier has no
    ///   handler. Every buffered byte has been drained into the diagnostic
    ///   dump by then, since the stream cannot be resynchronized.
    /// - [`ProtocolError::InvalidFrameLength`] when a length-prefixed frame
    ///   declares fewer bytes than its own header. The queue is left as is.
    pub fn pump_while<F>(&self, queue: &mut ByteQueue, is_active: F) -> Result<usize>
    where
        F: Fn() -> bool,
    {
        let mut dispatched = 0;

        while is_active() {
            let Some(id) = queue.peek_u8() else {
                break;
            };

            let Some(handler) = self.handlers.lookup(id) else {
                let drained = queue.drain();
                self.metrics.unknown_packet();
                diagnostics::unknown_packet(id, &drained);
                return Err(ProtocolError::UnknownPacket(id));
            };

            let frame_len = match handler.length() {
                PacketLength::Fixed(len) => len as usize,
                PacketLength::Dynamic => match queue.peek_u16_be(1) {
                    None => break,
                    Some(len) if (len as usize) < DYNAMIC_HEADER_LEN => {
                        return Err(ProtocolError::InvalidFrameLength { id, length: len });
                    }
                    Some(len) => len as usize,
                },
            };

            if queue.len() < frame_len {
                trace!(
                    id = format_args!("{id:#04x}"),
                    needed = frame_len,
                    buffered = queue.len(),
                    "Partial frame, waiting for more bytes"
                );
                break;
            }

            let mut frame = self.buffers.acquire_frame(frame_len);
            let copied = queue.dequeue(&mut frame[..frame_len]);
            debug_assert_eq!(copied, frame_len);

            self.dispatch(handler, &frame[..frame_len]);
            dispatched += 1;
        }

        Ok(dispatched)
    }

    fn dispatch(&self, handler: &PacketHandler, frame: &[u8]) {
        let mut reader = PacketReader::with_offset(frame, handler.length().header_len());

        match handler.route() {
            Route::Callback(callback) => {
                debug!(
                    id = format_args!("{:#04x}", handler.id()),
                    len = frame.len(),
                    "Dispatching packet"
                );
                callback(&mut reader);
                self.metrics.packet_dispatched();
            }
            Route::Extended => {
                if reader.remaining() < 2 {
                    self.metrics.unknown_packet();
                    diagnostics::truncated_extended(handler.id(), frame);
                    return;
                }

                let extended_id = reader.read_u16();
                match self.handlers.lookup_extended(extended_id) {
                    Some(callback) => {
                        debug!(
                            carrier = format_args!("{:#04x}", handler.id()),
                            id = format_args!("{extended_id:#06x}"),
                            len = frame.len(),
                            "Dispatching extended packet"
                        );
                        callback(&mut reader);
                        self.metrics.packet_dispatched();
                    }
                    None => {
                        self.metrics.unknown_packet();
                        diagnostics::unknown_extended(handler.id(), extended_id, frame);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for MessagePump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePump")
            .field("handlers", &self.handlers)
            .field("buffers", &self.buffers)
            .finish()
    }
}
