#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests across module boundaries
//! Compiled packets through the pump, pool hygiene, extended identifiers and
//! send-queue limits

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use netstate::core::byte_queue::ByteQueue;
use netstate::core::packet::{FramedPacket, Packet, PacketLength, RawPacket};
use netstate::core::reader::PacketReader;
use netstate::core::writer::{PacketWriter, WriterPool};
use netstate::error::ProtocolError;
use netstate::protocol::handlers::PacketHandlers;
use netstate::protocol::pump::MessagePump;
use netstate::transport::send_queue::SendQueue;
use netstate::utils::buffer_pool::BufferPool;
use netstate::utils::metrics::Metrics;

type Seen = Arc<Mutex<Vec<Vec<u8>>>>;

fn compile(packet: &dyn Packet) -> Vec<u8> {
    let mut writer = PacketWriter::new();
    packet.compile(&mut writer).expect("compile");
    writer.as_slice().to_vec()
}

// ============================================================================
// COMPILE -> PUMP
// ============================================================================

#[test]
fn test_compiled_frames_pump_back_to_their_handlers() {
    let seen: Seen = Arc::default();
    let mut handlers = PacketHandlers::new();
    let fixed = Arc::clone(&seen);
    handlers.register(0x02, 6, move |reader| {
        fixed.lock().unwrap().push(reader.remaining_bytes().to_vec());
    });
    let dynamic = Arc::clone(&seen);
    handlers.register(0xBF, 0, move |reader| {
        dynamic.lock().unwrap().push(reader.remaining_bytes().to_vec());
    });
    let pump = MessagePump::new(Arc::new(handlers), BufferPool::default());

    let mut queue = ByteQueue::new();
    queue.enqueue(&compile(&FramedPacket::fixed(0x02, 6, vec![1, 2])));
    queue.enqueue(&compile(&FramedPacket::dynamic(0xBF, vec![9; 40])));

    assert_eq!(pump.pump(&mut queue).unwrap(), 2);
    let seen = seen.lock().unwrap();
    // fixed frames are zero-filled to their declared length
    assert_eq!(seen[0], vec![1, 2, 0, 0, 0]);
    assert_eq!(seen[1], vec![9; 40]);
}

#[test]
fn test_fixed_packet_overflow_is_rejected() {
    let packet = FramedPacket::fixed(0x10, 3, vec![1, 2, 3]);
    let mut writer = PacketWriter::new();

    match packet.compile(&mut writer) {
        Err(ProtocolError::PacketOverflow {
            id: 0x10,
            declared: 3,
            written: 4,
        }) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_dynamic_packet_length_includes_header() {
    let bytes = compile(&FramedPacket::dynamic(0x3A, vec![0xEE; 5]));
    assert_eq!(bytes.len(), 8);
    assert_eq!(&bytes[..3], &[0x3A, 0x00, 0x08]);
    assert_eq!(PacketLength::from_declared(0), PacketLength::Dynamic);
}

#[test]
fn test_empty_raw_packet_compiles_to_nothing() {
    let bytes = compile(&RawPacket::new(Bytes::new()));
    assert!(bytes.is_empty());
}

#[test]
fn test_raw_packet_is_sent_verbatim() {
    let bytes = compile(&RawPacket::new(vec![0xEF, 1, 2, 3, 4]));
    assert_eq!(bytes, vec![0xEF, 1, 2, 3, 4]);
}

// ============================================================================
// READER / WRITER EDGE CASES
// ============================================================================

#[test]
fn test_null_terminated_strings_without_terminator() {
    let data = [0xAA, b'h', b'i'];
    let mut reader = PacketReader::with_offset(&data, 1);
    assert_eq!(reader.read_ascii_null(), "hi");
    assert!(reader.is_at_end());
    assert_eq!(reader.read_ascii_null(), "");
}

#[test]
fn test_truncated_utf16_reads_what_is_there() {
    let mut writer = PacketWriter::new();
    writer.write_unicode_le_null("Britain");
    let bytes = writer.as_slice();

    let mut reader = PacketReader::new(&bytes[..5]);
    assert_eq!(reader.read_unicode_le_null(), "Br");
    assert_eq!(reader.read_u32(), 0);
}

#[test]
fn test_non_ascii_is_substituted_in_ascii_fields() {
    let mut writer = PacketWriter::new();
    writer.write_ascii("né", 3);
    assert_eq!(writer.as_slice(), &[b'n', b'?', 0]);
}

#[test]
fn test_released_writer_comes_back_empty() {
    let pool = WriterPool::new(1);
    let mut writer = pool.acquire(32);
    writer.write_u32(0xDEADBEEF);
    pool.release(writer);

    let reused = pool.acquire(8);
    assert!(reused.is_empty());
    assert_eq!(pool.available(), 0);
}

#[test]
fn test_writer_pool_retention_is_bounded() {
    let pool = WriterPool::new(2);
    let writers: Vec<_> = (0..4).map(|_| pool.acquire(16)).collect();
    for writer in writers {
        pool.release(writer);
    }
    assert_eq!(pool.available(), 2);
}

// ============================================================================
// EXTENDED IDENTIFIERS
// ============================================================================

#[test]
fn test_unknown_extended_id_keeps_stream_in_sync() {
    let seen: Seen = Arc::default();
    let mut handlers = PacketHandlers::new();
    handlers.register_extension(0xBF, 0);
    let known = Arc::clone(&seen);
    handlers.register_extended(0x0018, move |reader| {
        known.lock().unwrap().push(reader.remaining_bytes().to_vec());
    });
    let metrics = Arc::new(Metrics::new());
    let pump = MessagePump::new(Arc::new(handlers), BufferPool::default())
        .with_metrics(Arc::clone(&metrics));

    let mut queue = ByteQueue::new();
    // unknown extended id 0x0099, then a known one
    queue.enqueue(&[0xBF, 0x00, 0x06, 0x00, 0x99, 0x01]);
    queue.enqueue(&[0xBF, 0x00, 0x07, 0x00, 0x18, 0xAB, 0xCD]);

    pump.pump(&mut queue).unwrap();
    assert!(queue.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![vec![0xAB, 0xCD]]);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.unknown_packets, 1);
    assert_eq!(snapshot.packets_dispatched, 1);
}

#[test]
fn test_unknown_id_after_valid_frame_drains_the_rest() {
    let seen: Seen = Arc::default();
    let mut handlers = PacketHandlers::new();
    let record = Arc::clone(&seen);
    handlers.register(0x01, 2, move |reader| {
        record.lock().unwrap().push(reader.remaining_bytes().to_vec());
    });
    let pump = MessagePump::new(Arc::new(handlers), BufferPool::default());

    let mut queue = ByteQueue::new();
    queue.enqueue(&[0x01, 0x05, 0x77, 0x01, 0x06]);

    match pump.pump(&mut queue) {
        Err(ProtocolError::UnknownPacket(0x77)) => {}
        other => panic!("unexpected: {other:?}"),
    }
    // the frame in front was dispatched, nothing after the unknown id was
    assert_eq!(*seen.lock().unwrap(), vec![vec![0x05]]);
    assert!(queue.is_empty());
}

#[test]
fn test_last_registration_wins() {
    let seen: Seen = Arc::default();
    let mut handlers = PacketHandlers::new();
    handlers.register(0x01, 4, |_| panic!("replaced handler must not run"));
    let record = Arc::clone(&seen);
    handlers.register(0x01, 2, move |reader| {
        record.lock().unwrap().push(reader.remaining_bytes().to_vec());
    });
    assert_eq!(handlers.len(), 1);

    let pump = MessagePump::new(Arc::new(handlers), BufferPool::default());
    let mut queue = ByteQueue::new();
    queue.enqueue(&[0x01, 0x42]);
    assert_eq!(pump.pump(&mut queue).unwrap(), 1);
}

// ============================================================================
// SEND QUEUE
// ============================================================================

#[test]
fn test_ceiling_crossing_enqueue_fails_deterministically() {
    let mut queue = SendQueue::new(100, 100);
    for i in 0..10u8 {
        queue.enqueue(Bytes::from(vec![1u8; 10]), i).unwrap();
    }
    let rejected = queue.enqueue(Bytes::from_static(&[2]), 10).unwrap_err();
    assert!(matches!(
        rejected.error,
        ProtocolError::SendCapacityExceeded { .. }
    ));
    assert_eq!(rejected.token, 10);
    assert_eq!(queue.pending_bytes(), 100);

    assert!(queue.check_flush_ready());
    let merged = queue.dequeue().unwrap();
    assert_eq!(merged.grams(), 10);
    assert_eq!(merged.tokens, (0..10).collect::<Vec<u8>>());
    assert!(merged.bytes.iter().all(|&b| b == 1));
}
