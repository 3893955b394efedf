//! # Error Types
//!
//! Error handling for the transport and framing layer.
//!
//! This module defines every failure that can occur while connecting, framing
//! received bytes, compiling outbound packets, or queueing them for the socket.
//!
//! ## Error Categories
//! - **Socket Errors**: connect/receive/send failures and orderly remote close
//! - **Framing Errors**: unknown identifiers, implausible declared lengths
//! - **Send Errors**: empty or oversized compiled packets, send-queue ceiling
//! - **Configuration Errors**: invalid addresses and configuration files
//!
//! None of these ever reach a registered packet handler. Errors raised inside a
//! connection are logged and turned into a disposal whose reason is reported
//! through [`crate::transport::net_state::NetEvent::Disconnected`].
//!
//! ## Example Usage
//! ```rust
//! use netstate::error::{ProtocolError, Result};
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|_| ProtocolError::InvalidAddress(raw.to_string()))
//! }
//!
//! assert!(parse_port("2593").is_ok());
//! assert!(parse_port("login.example.com").is_err());
//! ```

use thiserror::Error;

use crate::transport::net_state::ConnectionState;

/// Messages for the fixed-text errors, shared with disconnect reasons.
pub mod constants {
    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed by remote";
    pub const ERR_CONNECTION_TIMEOUT: &str = "Connection timed out (no activity)";
    pub const ERR_CONNECT_TIMEOUT: &str = "Connect attempt timed out";
    pub const ERR_NO_RUNTIME: &str = "No async runtime available to drive the connection";

    /// Compression errors
    pub const ERR_COMPRESSION_FAILED: &str = "Compression failed";
    pub const ERR_DECOMPRESSION_FAILED: &str = "Decompression failed";
}

/// ProtocolError is the error type for all transport operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid address: {0} (a numeric IPv4 or IPv6 address is required)")]
    InvalidAddress(String),

    #[error("{}", constants::ERR_NO_RUNTIME)]
    NoRuntime,

    #[error("Operation not allowed while connection is {0:?}")]
    InvalidState(ConnectionState),

    #[error("Unknown packet identifier {0:#04x}")]
    UnknownPacket(u8),

    #[error("Invalid frame length {length} for packet {id:#04x}")]
    InvalidFrameLength { id: u8, length: u16 },

    #[error("Packet {0:#04x} compiled to an empty buffer")]
    EmptyPacket(u8),

    #[error("Packet {id:#04x} wrote {written} bytes into a {declared}-byte frame")]
    PacketOverflow {
        id: u8,
        declared: usize,
        written: usize,
    },

    #[error("Send queue capacity exceeded: {pending} pending + {attempted} > {limit} bytes")]
    SendCapacityExceeded {
        pending: usize,
        attempted: usize,
        limit: usize,
    },

    #[error("{}", constants::ERR_CONNECTION_CLOSED)]
    ConnectionClosed,

    #[error("{}", constants::ERR_CONNECTION_TIMEOUT)]
    ConnectionTimeout,

    #[error("{}", constants::ERR_CONNECT_TIMEOUT)]
    ConnectTimeout,

    #[error("{}", constants::ERR_COMPRESSION_FAILED)]
    CompressionFailure,

    #[error("{}", constants::ERR_DECOMPRESSION_FAILED)]
    DecompressionFailure,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
