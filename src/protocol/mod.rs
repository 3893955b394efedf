//! # Protocol Layer
//!
//! Inbound framing and dispatch.
//!
//! [`handlers::PacketHandlers`] maps identifiers to declared lengths and
//! callbacks. [`pump::MessagePump`] uses it to cut complete frames out of a
//! byte queue and hand each one to its callback. Frames nobody registered for
//! are dumped through [`trace`] for diagnosis.

pub mod handlers;
pub mod pump;
pub mod trace;
