use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkCodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("chunk fmt {fmt} seen on csid {csid} before any type-0 chunk established it")]
    UnestablishedChunkStream { csid: u32, fmt: u8 },
    #[error("declared message length {declared} exceeds the configured cap of {max}")]
    MessageTooLarge { declared: u32, max: u32 },
    #[error(
        "chunk payload fill {fill} does not match the message length {declared} already buffered on csid {csid}"
    )]
    MessageLengthMismatch {
        csid: u32,
        declared: u32,
        fill: usize,
    },
    #[error("chunk size {0} outside the permitted [1, 65536] range")]
    InvalidChunkSize(u32),
}

pub type ChunkCodecResult<T> = Result<T, ChunkCodecError>;
