//! # Utility Modules
//!
//! Supporting utilities: buffer pooling, compression, logging and metrics.
//!
//! ## Components
//! - **Buffer Pool**: fixed-size receive buffers returned to a shared free list on drop
//! - **Compression**: LZ4 and Zstd envelopes for outbound grams
//! - **Logging**: `tracing-subscriber` initialisation
//! - **Metrics**: Thread-safe transport counters

pub mod buffer_pool;
pub mod compression;
pub mod logging;
pub mod metrics;
