use std::{io, time::SystemTimeError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("digest did not match at either candidate offset")]
    Invalid,
    #[error("hmac produced {length} bytes, expected 32")]
    WrongLength { length: usize },
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported handshake version: {0}")]
    BadVersion(u8),
    #[error("digest error: {0}")]
    DigestError(#[from] DigestError),
    #[error("system clock error: {0}")]
    SystemTime(#[from] SystemTimeError),
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;
