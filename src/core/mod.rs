//! # Core Components
//!
//! Byte-level building blocks shared by the receive and send paths.
//!
//! ## Components
//! - **ByteQueue**: FIFO of received bytes awaiting framing
//! - **PacketReader**: bounds-safe big-endian cursor over one frame
//! - **PacketWriter**: growable big-endian builder, pooled through `WriterPool`
//! - **Packet**: outbound packet trait and the frame compiler
//!
//! ## Wire Format
//! ```text
//! fixed:    [id(1)] [payload]                 total = declared length
//! dynamic:  [id(1)] [total(2, BE)] [payload]  total >= 3
//! ```
//! Integers are big-endian. Strings are ASCII or UTF-16 (either byte order),
//! fixed-width or NUL-terminated.

pub mod byte_queue;
pub mod packet;
pub mod reader;
pub mod writer;
