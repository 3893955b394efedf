//! Services shared by connections.
//!
//! Everything a connection borrows from its surroundings is built here once
//! and cloned into each [`crate::NetState`]: the handler table, the receive
//! buffer pool, the writer pool and the metrics counters. Nothing is global, so
//! two contexts (for example in two tests) never observe each other.

use std::sync::Arc;

use crate::config::TransportConfig;
use crate::core::writer::WriterPool;
use crate::protocol::handlers::PacketHandlers;
use crate::utils::buffer_pool::BufferPool;
use crate::utils::metrics::Metrics;

#[derive(Clone, Debug)]
pub struct NetContext {
    pub handlers: Arc<PacketHandlers>,
    pub buffers: BufferPool,
    pub writers: WriterPool,
    pub metrics: Arc<Metrics>,
}

impl NetContext {
    /// Freeze `handlers` and size the pools from `transport`
    pub fn new(handlers: PacketHandlers, transport: &TransportConfig) -> Self {
        Self {
            handlers: Arc::new(handlers),
            buffers: BufferPool::new(
                transport.receive_buffer_size,
                transport.buffer_pool_preallocate,
            ),
            writers: WriterPool::new(transport.writer_pool_size),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Share an existing metrics collector instead of a fresh one
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_follow_transport_config() {
        let transport = TransportConfig {
            receive_buffer_size: 512,
            buffer_pool_preallocate: 3,
            ..TransportConfig::default()
        };
        let ctx = NetContext::new(PacketHandlers::new(), &transport);
        assert_eq!(ctx.buffers.slot_size(), 512);
        assert_eq!(ctx.buffers.available(), 3);

        let clone = ctx.clone();
        drop(clone.buffers.acquire());
        assert_eq!(ctx.buffers.available(), 3);
        assert!(Arc::ptr_eq(&ctx.metrics, &clone.metrics));
    }
}
