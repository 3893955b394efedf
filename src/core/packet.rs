//! # Outbound Packets
//!
//! A [`Packet`] describes one outbound message: its identifier, its declared
//! length and how to write its body. [`Packet::compile`] frames it:
//!
//! ```text
//! fixed:    [id(1)] [body ... zero padding up to the declared length]
//! dynamic:  [id(1)] [total length(2, BE)] [body]
//! ```
//!
//! Every packet gets exactly one [`Packet::on_sent`] call once the connection
//! has either written its bytes to the socket or dropped it.

use bytes::Bytes;

use crate::core::writer::PacketWriter;
use crate::error::{ProtocolError, Result};

/// Size of a dynamic-length frame header: identifier plus u16 length
pub const DYNAMIC_HEADER_LEN: usize = 3;

/// Declared size of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLength {
    /// Exactly this many bytes, identifier included
    Fixed(u16),
    /// Carries its own u16 length after the identifier
    Dynamic,
}

impl PacketLength {
    /// Map a declared length where `0` means "length-prefixed"
    pub fn from_declared(declared: u16) -> Self {
        if declared == 0 {
            PacketLength::Dynamic
        } else {
            PacketLength::Fixed(declared)
        }
    }

    /// The declared length as stored in handler tables (`0` for dynamic)
    pub fn declared(self) -> u16 {
        match self {
            PacketLength::Fixed(len) => len,
            PacketLength::Dynamic => 0,
        }
    }

    /// Bytes before the body starts
    pub fn header_len(self) -> usize {
        match self {
            PacketLength::Fixed(_) => 1,
            PacketLength::Dynamic => DYNAMIC_HEADER_LEN,
        }
    }
}

/// What happened to a packet handed to [`crate::transport::net_state::NetState::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Bytes were written to the socket
    Sent,
    /// Never written: not running, refused, or cut off by disposal
    Dropped,
}

pub trait Packet: Send {
    fn id(&self) -> u8;

    fn length(&self) -> PacketLength;

    /// Write everything after the frame header
    fn write_body(&self, writer: &mut PacketWriter);

    /// Capacity to reserve in the writer before compiling
    fn size_hint(&self) -> usize {
        match self.length() {
            PacketLength::Fixed(len) => len as usize,
            PacketLength::Dynamic => 64,
        }
    }

    /// Called exactly once after the packet's bytes were written or dropped
    fn on_sent(&mut self, _outcome: SendOutcome) {}

    /// Frame the packet into `writer`
    fn compile(&self, writer: &mut PacketWriter) -> Result<()> {
        let id = self.id();
        let start = writer.len();
        writer.write_u8(id);

        match self.length() {
            PacketLength::Fixed(declared) => {
                self.write_body(writer);
                let written = writer.len() - start;
                if written > declared as usize {
                    return Err(ProtocolError::PacketOverflow {
                        id,
                        declared: declared as usize,
                        written,
                    });
                }
                writer.fill(start + declared as usize);
            }
            PacketLength::Dynamic => {
                writer.write_u16(0);
                self.write_body(writer);
                let written = writer.len() - start;
                let total = u16::try_from(written).map_err(|_| ProtocolError::PacketOverflow {
                    id,
                    declared: u16::MAX as usize,
                    written,
                })?;
                writer.patch_u16(start + 1, total);
            }
        }

        Ok(())
    }
}

type SentCallback = Box<dyn FnOnce(SendOutcome) + Send>;

/// A packet whose body is already serialized
pub struct FramedPacket {
    id: u8,
    length: PacketLength,
    body: Bytes,
    callback: Option<SentCallback>,
}

impl FramedPacket {
    pub fn fixed(id: u8, length: u16, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            length: PacketLength::Fixed(length),
            body: body.into(),
            callback: None,
        }
    }

    pub fn dynamic(id: u8, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            length: PacketLength::Dynamic,
            body: body.into(),
            callback: None,
        }
    }

    /// Run `callback` once the packet has been sent or dropped
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(SendOutcome) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl Packet for FramedPacket {
    fn id(&self) -> u8 {
        self.id
    }

    fn length(&self) -> PacketLength {
        self.length
    }

    fn write_body(&self, writer: &mut PacketWriter) {
        writer.write_bytes(&self.body);
    }

    fn size_hint(&self) -> usize {
        self.length.header_len() + self.body.len()
    }

    fn on_sent(&mut self, outcome: SendOutcome) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

impl std::fmt::Debug for FramedPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedPacket")
            .field("id", &format_args!("{:#04x}", self.id))
            .field("length", &self.length)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Pre-framed bytes sent verbatim. No framing is applied or checked.
pub struct RawPacket {
    bytes: Bytes,
    callback: Option<SentCallback>,
}

impl RawPacket {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            callback: None,
        }
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(SendOutcome) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl Packet for RawPacket {
    fn id(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }

    fn length(&self) -> PacketLength {
        PacketLength::Fixed(self.bytes.len().min(u16::MAX as usize) as u16)
    }

    fn write_body(&self, writer: &mut PacketWriter) {
        writer.write_bytes(self.bytes.get(1..).unwrap_or_default());
    }

    fn size_hint(&self) -> usize {
        self.bytes.len()
    }

    fn on_sent(&mut self, outcome: SendOutcome) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }

    fn compile(&self, writer: &mut PacketWriter) -> Result<()> {
        writer.write_bytes(&self.bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn compiled(packet: &dyn Packet) -> Result<Vec<u8>> {
        let mut writer = PacketWriter::with_capacity(packet.size_hint());
        packet.compile(&mut writer)?;
        Ok(writer.as_slice().to_vec())
    }

    #[test]
    fn fixed_packet_is_padded_to_declared_length() {
        let packet = FramedPacket::fixed(0x73, 6, vec![0x01, 0x02]);
        assert_eq!(compiled(&packet).unwrap(), vec![0x73, 0x01, 0x02, 0, 0, 0]);
    }

    #[test]
    fn fixed_packet_overflow_is_rejected() {
        let packet = FramedPacket::fixed(0x73, 2, vec![0x01, 0x02]);
        match compiled(&packet) {
            Err(ProtocolError::PacketOverflow {
                id: 0x73,
                declared: 2,
                written: 3,
            }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn dynamic_packet_carries_total_length() {
        let packet = FramedPacket::dynamic(0xAD, b"hey".to_vec());
        assert_eq!(
            compiled(&packet).unwrap(),
            vec![0xAD, 0x00, 0x06, b'h', b'e', b'y']
        );
    }

    #[test]
    fn dynamic_packet_longer_than_u16_is_rejected() {
        let packet = FramedPacket::dynamic(0xAD, vec![0u8; u16::MAX as usize]);
        assert!(matches!(
            compiled(&packet),
            Err(ProtocolError::PacketOverflow { id: 0xAD, .. })
        ));
    }

    #[test]
    fn raw_packet_is_verbatim() {
        let packet = RawPacket::new(vec![0x02, 0x03, 0x04]);
        assert_eq!(packet.id(), 0x02);
        assert_eq!(compiled(&packet).unwrap(), vec![0x02, 0x03, 0x04]);
        assert!(compiled(&RawPacket::new(Vec::new())).unwrap().is_empty());
    }

    #[test]
    fn callback_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut packet = FramedPacket::fixed(0x01, 1, Vec::new()).with_callback(move |outcome| {
            assert_eq!(outcome, SendOutcome::Sent);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        packet.on_sent(SendOutcome::Sent);
        packet.on_sent(SendOutcome::Sent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn declared_length_mapping() {
        assert_eq!(PacketLength::from_declared(0), PacketLength::Dynamic);
        assert_eq!(PacketLength::from_declared(5), PacketLength::Fixed(5));
        assert_eq!(PacketLength::Dynamic.declared(), 0);
        assert_eq!(PacketLength::Fixed(7).header_len(), 1);
        assert_eq!(PacketLength::Dynamic.header_len(), DYNAMIC_HEADER_LEN);
    }
}
