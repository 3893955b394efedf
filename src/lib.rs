//! # netstate
//!
//! Client-side transport for a binary, identifier-framed TCP protocol.
//!
//! Received bytes are buffered in a [`ByteQueue`], cut into frames by the
//! [`MessagePump`] according to the lengths registered in [`PacketHandlers`],
//! and handed to callbacks through a bounds-safe [`PacketReader`]. Outbound
//! packets are compiled with a pooled [`PacketWriter`], optionally compressed,
//! and coalesced by the send queue before hitting the socket.
//!
//! ## Example
//! ```rust,no_run
//! use netstate::{FramedPacket, NetContext, NetEvent, NetState, NetworkConfig, PacketHandlers};
//!
//! # async fn run() -> netstate::Result<()> {
//! let config = NetworkConfig::default();
//!
//! let mut handlers = PacketHandlers::new();
//! handlers.register(0x73, 2, |reader| {
//!     tracing::debug!(seq = reader.read_u8(), "ping");
//! });
//!
//! let ctx = NetContext::new(handlers, &config.transport);
//! let (state, mut events) = NetState::new(ctx, &config);
//! state.connect("127.0.0.1", 2593)?;
//!
//! if let Some(NetEvent::Connected { peer }) = events.recv().await {
//!     tracing::info!(%peer, "up");
//!     state.send(FramedPacket::fixed(0x73, 2, vec![1]));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use config::NetworkConfig;
pub use context::NetContext;
pub use crate::core::byte_queue::ByteQueue;
pub use crate::core::packet::{FramedPacket, Packet, PacketLength, RawPacket, SendOutcome};
pub use crate::core::reader::PacketReader;
pub use crate::core::writer::{PacketWriter, WriterPool};
pub use error::{ProtocolError, Result};
pub use protocol::handlers::PacketHandlers;
pub use protocol::pump::MessagePump;
pub use transport::net_state::{
    ConnectionState, DisconnectReason, EventReceiver, NetEvent, NetState,
};
pub use utils::buffer_pool::BufferPool;
pub use utils::metrics::{Metrics, MetricsSnapshot};
