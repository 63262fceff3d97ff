use std::{io, string};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmfReadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid utf8 data: {0}")]
    InvalidUtf8(#[from] string::FromUtf8Error),
    #[error("unknown amf0 marker: {marker}")]
    Unknown { marker: u8 },
    #[error("invalid value for a unix date: {milliseconds}")]
    InvalidDate { milliseconds: f64 },
    #[error("object missing terminating marker")]
    UnterminatedObject,
}

pub type AmfReadResult<T> = Result<T, AmfReadError>;

#[derive(Error, Debug)]
pub enum AmfWriteError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("size value out of range, value: {value}")]
    SizeOutOfRange { value: usize },
}

pub type AmfWriteResult = Result<(), AmfWriteError>;
