//! Property-based tests using proptest
//!
//! These tests validate framing invariants across randomly generated inputs:
//! byte order is preserved through the queue, frames are dispatched exactly
//! once no matter how the stream is chunked, and malformed input never panics.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use netstate::core::byte_queue::ByteQueue;
use netstate::core::reader::PacketReader;
use netstate::core::writer::PacketWriter;
use netstate::protocol::handlers::PacketHandlers;
use netstate::protocol::pump::MessagePump;
use netstate::utils::buffer_pool::BufferPool;
use proptest::prelude::*;

/// Split `data` at the given cut points (taken modulo its length)
fn chunked(data: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut points: Vec<usize> = cuts.iter().map(|c| c % data.len()).collect();
    points.push(0);
    points.push(data.len());
    points.sort_unstable();
    points.dedup();
    points.windows(2).map(|w| data[w[0]..w[1]].to_vec()).collect()
}

fn recording_pump(register: impl FnOnce(&mut PacketHandlers, Arc<Mutex<Vec<Vec<u8>>>>)) -> (MessagePump, Arc<Mutex<Vec<Vec<u8>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut handlers = PacketHandlers::new();
    register(&mut handlers, Arc::clone(&seen));
    let pump = MessagePump::new(Arc::new(handlers), BufferPool::new(64, 2));
    (pump, seen)
}

// Property: bytes come out of the queue in the order they went in
proptest! {
    #[test]
    fn prop_byte_queue_fifo(
        data in prop::collection::vec(any::<u8>(), 0..4096),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
        read_sizes in prop::collection::vec(1usize..512, 1..32),
    ) {
        let mut queue = ByteQueue::with_capacity(16);
        for chunk in chunked(&data, &cuts) {
            queue.enqueue(&chunk);
        }
        prop_assert_eq!(queue.len(), data.len());

        let mut out = Vec::with_capacity(data.len());
        let mut sizes = read_sizes.iter().cycle();
        while !queue.is_empty() {
            let mut buf = vec![0u8; *sizes.next().unwrap()];
            let n = queue.dequeue(&mut buf);
            out.extend_from_slice(&buf[..n]);
        }

        prop_assert_eq!(out, data);
    }
}

// Property: N fixed-length frames are dispatched N times with disjoint payloads,
// however the stream is chunked
proptest! {
    #[test]
    fn prop_fixed_frames_dispatched_once(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 7), 1..40),
        cuts in prop::collection::vec(any::<usize>(), 0..24),
    ) {
        let (pump, seen) = recording_pump(|handlers, seen| {
            handlers.register(0x22, 8, move |reader| {
                seen.lock().unwrap().push(reader.remaining_bytes().to_vec());
            });
        });

        let mut stream = Vec::new();
        for payload in &payloads {
            stream.push(0x22);
            stream.extend_from_slice(payload);
        }

        let mut queue = ByteQueue::new();
        let mut dispatched = 0;
        for chunk in chunked(&stream, &cuts) {
            queue.enqueue(&chunk);
            dispatched += pump.pump(&mut queue).unwrap();
        }

        prop_assert_eq!(dispatched, payloads.len());
        prop_assert!(queue.is_empty());
        prop_assert_eq!(&*seen.lock().unwrap(), &payloads);
    }
}

// Property: length-prefixed frames of any size reassemble across chunk boundaries
proptest! {
    #[test]
    fn prop_dynamic_frames_reassemble(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 1..12),
        cuts in prop::collection::vec(any::<usize>(), 0..24),
    ) {
        let (pump, seen) = recording_pump(|handlers, seen| {
            handlers.register(0xAE, 0, move |reader| {
                seen.lock().unwrap().push(reader.remaining_bytes().to_vec());
            });
        });

        let mut stream = Vec::new();
        for payload in &payloads {
            let total = (payload.len() + 3) as u16;
            stream.push(0xAE);
            stream.extend_from_slice(&total.to_be_bytes());
            stream.extend_from_slice(payload);
        }

        let mut queue = ByteQueue::new();
        for chunk in chunked(&stream, &cuts) {
            queue.enqueue(&chunk);
            pump.pump(&mut queue).unwrap();
        }

        prop_assert!(queue.is_empty());
        prop_assert_eq!(&*seen.lock().unwrap(), &payloads);
    }
}

// Property: reading past the end of arbitrary bytes never panics
proptest! {
    #[test]
    fn prop_reader_is_bounds_safe(
        data in prop::collection::vec(any::<u8>(), 0..64),
        ops in prop::collection::vec(0u8..8, 0..64),
    ) {
        let mut reader = PacketReader::new(&data);
        for op in ops {
            match op {
                0 => { reader.read_u8(); }
                1 => { reader.read_u16(); }
                2 => { reader.read_u32(); }
                3 => { reader.read_i64(); }
                4 => { reader.read_ascii(5); }
                5 => { reader.read_ascii_null(); }
                6 => { reader.read_unicode_be_null(); }
                _ => { reader.read_unicode_le(3); }
            }
            prop_assert!(reader.position() <= data.len());
        }
    }
}

// Property: fixed-width strings occupy exactly their declared width
proptest! {
    #[test]
    fn prop_fixed_width_strings_are_exact(value in "[a-zA-Z0-9 ]{0,40}", width in 0usize..32) {
        let mut writer = PacketWriter::new();
        writer.write_ascii(&value, width);
        writer.write_unicode_be(&value, width);
        writer.write_unicode_le(&value, width);
        prop_assert_eq!(writer.len(), width * 5);

        let bytes = writer.as_slice().to_vec();
        let mut reader = PacketReader::new(&bytes);
        let expected: String = value.chars().take(width).collect();
        prop_assert_eq!(reader.read_ascii(width), expected.clone());
        prop_assert_eq!(reader.read_unicode_be(width), expected.clone());
        prop_assert_eq!(reader.read_unicode_le(width), expected);
    }
}
