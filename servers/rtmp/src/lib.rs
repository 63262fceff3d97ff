//! The RTMP connection state machine and server dispatcher: accepts TCP
//! connections, drives each through handshake, demuxing and command
//! dispatch, and surfaces audio/video/metadata through a callback surface.
//! See the `rtmp-formats` crate for the wire-level codecs this sits on top
//! of.

pub mod callbacks;
pub mod config;
mod connection;
pub mod errors;
pub mod server;

pub use callbacks::{
    ConnectionEventKind, ConnectionInfo, ConnectionPhase, ConnectionRole, FrameEvent,
    ServerCallbacks, ServerState, StreamMetadata,
};
pub use config::RtmpServerConfig;
pub use errors::{ConnectionError, ServerError, ServerResult};
pub use server::RtmpServer;
