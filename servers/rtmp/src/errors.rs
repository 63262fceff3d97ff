use std::io;

use rtmp_formats::{chunk::errors::ChunkCodecError, handshake::errors::HandshakeError, message::RtmpMessageError};
use thiserror::Error;

/// Errors a single connection task can hit. Every one of these ends the
/// connection; none of them ever escape to another connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("recv timeout exceeded")]
    Timeout,
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("callback error: {0}")]
    Callback(String),
}

impl From<ChunkCodecError> for ConnectionError {
    fn from(value: ChunkCodecError) -> Self {
        match value {
            ChunkCodecError::MessageTooLarge { .. } => {
                ConnectionError::ResourceExhausted(value.to_string())
            }
            other => ConnectionError::Protocol(other.to_string()),
        }
    }
}

impl From<RtmpMessageError> for ConnectionError {
    fn from(value: RtmpMessageError) -> Self {
        ConnectionError::Protocol(value.to_string())
    }
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
