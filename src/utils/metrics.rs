//! Observability and Metrics
//!
//! Transport counters shared by every connection built from one
//! [`crate::NetContext`]. Uses atomic counters for thread-safe collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for transport operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Currently connected connections
    pub connections_active: AtomicU64,
    /// Connect attempts that failed
    pub connect_failures: AtomicU64,
    /// Socket reads that delivered bytes
    pub receives: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Frames handed to a packet handler
    pub packets_dispatched: AtomicU64,
    /// Frames with no handler (dense or extended)
    pub unknown_packets: AtomicU64,
    /// Packets accepted by a send queue
    pub packets_sent: AtomicU64,
    /// Packets dropped without being sent
    pub packets_dropped: AtomicU64,
    /// Socket writes completed
    pub transmissions: AtomicU64,
    /// Socket writes that merged more than one gram
    pub coalesced_transmissions: AtomicU64,
    /// Total bytes written to sockets
    pub bytes_sent: AtomicU64,
    /// Grams compressed before queueing
    pub compressed_grams: AtomicU64,
    /// Disconnects caused by malformed inbound frames
    pub protocol_errors: AtomicU64,
    /// Disconnects caused by socket failures
    pub connection_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            receives: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_dispatched: AtomicU64::new(0),
            unknown_packets: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            transmissions: AtomicU64::new(0),
            coalesced_transmissions: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            compressed_grams: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connected connection being disposed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one socket read
    pub fn received(&self, byte_count: u64) {
        self.receives.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn packet_dispatched(&self) {
        self.packets_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_packet(&self) {
        self.unknown_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed socket write carrying `grams` queued grams
    pub fn transmitted(&self, byte_count: u64, grams: usize) {
        self.transmissions.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
        if grams > 1 {
            self.coalesced_transmissions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn gram_compressed(&self) {
        self.compressed_grams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            receives: self.receives.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_dispatched: self.packets_dispatched.load(Ordering::Relaxed),
            unknown_packets: self.unknown_packets.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            transmissions: self.transmissions.load(Ordering::Relaxed),
            coalesced_transmissions: self.coalesced_transmissions.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            compressed_grams: self.compressed_grams.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connect_failures = snapshot.connect_failures,
            receives = snapshot.receives,
            bytes_received = snapshot.bytes_received,
            packets_dispatched = snapshot.packets_dispatched,
            unknown_packets = snapshot.unknown_packets,
            packets_sent = snapshot.packets_sent,
            packets_dropped = snapshot.packets_dropped,
            transmissions = snapshot.transmissions,
            coalesced_transmissions = snapshot.coalesced_transmissions,
            bytes_sent = snapshot.bytes_sent,
            compressed_grams = snapshot.compressed_grams,
            protocol_errors = snapshot.protocol_errors,
            connection_errors = snapshot.connection_errors,
            uptime_seconds = snapshot.uptime_seconds,
            "Transport metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connect_failures: u64,
    pub receives: u64,
    pub bytes_received: u64,
    pub packets_dispatched: u64,
    pub unknown_packets: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub transmissions: u64,
    pub coalesced_transmissions: u64,
    pub bytes_sent: u64,
    pub compressed_grams: u64,
    pub protocol_errors: u64,
    pub connection_errors: u64,
    pub uptime_seconds: u64,
}
