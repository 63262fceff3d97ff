//! RTMP protocol core: chunk framing, the handshake engine, and the
//! message-level types (protocol control, user control, AMF0 commands)
//! that ride on top of it. No I/O and no connection lifecycle live here;
//! see the `rtmp-server` crate for the state machine and dispatcher.

pub mod chunk;
pub mod commands;
pub mod handshake;
pub mod message;
pub mod protocol_control;
pub mod user_control;
