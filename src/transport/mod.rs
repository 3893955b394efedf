//! # Transport Layer
//!
//! The TCP connection and its outbound queue.

pub mod net_state;
pub mod send_queue;
