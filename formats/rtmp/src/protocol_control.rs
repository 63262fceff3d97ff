//! Protocol control messages (message type ids 1-6): chunk-size negotiation,
//! abort, acknowledgement, and bandwidth/window advertisement.

use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

pub const CSID: u32 = 2;
pub const MESSAGE_STREAM_ID: u32 = 0;

#[derive(Debug, Error)]
pub enum ProtocolControlError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown protocol control message type id: {0}")]
    UnknownMessageType(u8),
    #[error("unknown peer-bandwidth limit type: {0}")]
    UnknownLimitType(u8),
    #[error("protocol control payload too short: {0} bytes")]
    TooShort(usize),
}

pub type ProtocolControlResult<T> = Result<T, ProtocolControlError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitType {
    Hard = 0,
    Soft = 1,
    Dynamic = 2,
}

impl TryFrom<u8> for LimitType {
    type Error = ProtocolControlError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LimitType::Hard),
            1 => Ok(LimitType::Soft),
            2 => Ok(LimitType::Dynamic),
            other => Err(ProtocolControlError::UnknownLimitType(other)),
        }
    }
}

impl From<LimitType> for u8 {
    fn from(value: LimitType) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolControlMessage {
    SetChunkSize { chunk_size: u32 },
    Abort { chunk_stream_id: u32 },
    Acknowledgement { sequence_number: u32 },
    WindowAckSize { size: u32 },
    SetPeerBandwidth { size: u32, limit_type: LimitType },
}

impl ProtocolControlMessage {
    pub fn message_type_id(&self) -> u8 {
        match self {
            ProtocolControlMessage::SetChunkSize { .. } => 1,
            ProtocolControlMessage::Abort { .. } => 2,
            ProtocolControlMessage::Acknowledgement { .. } => 3,
            ProtocolControlMessage::WindowAckSize { .. } => 5,
            ProtocolControlMessage::SetPeerBandwidth { .. } => 6,
        }
    }

    pub fn read_from(message_type_id: u8, payload: &[u8]) -> ProtocolControlResult<Self> {
        let mut cursor = io::Cursor::new(payload);
        match message_type_id {
            1 => Ok(ProtocolControlMessage::SetChunkSize {
                // the top bit is reserved and always zero on the wire
                chunk_size: cursor.read_u32::<BigEndian>()? & 0x7FFF_FFFF,
            }),
            2 => Ok(ProtocolControlMessage::Abort {
                chunk_stream_id: cursor.read_u32::<BigEndian>()?,
            }),
            3 => Ok(ProtocolControlMessage::Acknowledgement {
                sequence_number: cursor.read_u32::<BigEndian>()?,
            }),
            5 => Ok(ProtocolControlMessage::WindowAckSize {
                size: cursor.read_u32::<BigEndian>()?,
            }),
            6 => {
                if payload.len() < 5 {
                    return Err(ProtocolControlError::TooShort(payload.len()));
                }
                let size = cursor.read_u32::<BigEndian>()?;
                let limit_type = LimitType::try_from(cursor.read_u8()?)?;
                Ok(ProtocolControlMessage::SetPeerBandwidth { size, limit_type })
            }
            other => Err(ProtocolControlError::UnknownMessageType(other)),
        }
    }

    pub fn write_to<W: io::Write>(&self, writer: &mut W) -> ProtocolControlResult<()> {
        match *self {
            ProtocolControlMessage::SetChunkSize { chunk_size } => {
                writer.write_u32::<BigEndian>(chunk_size & 0x7FFF_FFFF)?;
            }
            ProtocolControlMessage::Abort { chunk_stream_id } => {
                writer.write_u32::<BigEndian>(chunk_stream_id)?;
            }
            ProtocolControlMessage::Acknowledgement { sequence_number } => {
                writer.write_u32::<BigEndian>(sequence_number)?;
            }
            ProtocolControlMessage::WindowAckSize { size } => {
                writer.write_u32::<BigEndian>(size)?;
            }
            ProtocolControlMessage::SetPeerBandwidth { size, limit_type } => {
                writer.write_u32::<BigEndian>(size)?;
                writer.write_u8(limit_type.into())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_peer_bandwidth_round_trips_big_endian() {
        let msg = ProtocolControlMessage::SetPeerBandwidth {
            size: 2_500_000,
            limit_type: LimitType::Dynamic,
        };
        let mut buf = Vec::new();
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf, vec![0x00, 0x26, 0x25, 0xA0, 0x02]);
        let decoded = ProtocolControlMessage::read_from(6, &buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn set_chunk_size_masks_reserved_bit() {
        let buf = [0x80, 0x00, 0x10, 0x00];
        let decoded = ProtocolControlMessage::read_from(1, &buf).unwrap();
        assert_eq!(
            decoded,
            ProtocolControlMessage::SetChunkSize { chunk_size: 4096 }
        );
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let err = ProtocolControlMessage::read_from(42, &[0; 4]).unwrap_err();
        assert!(matches!(err, ProtocolControlError::UnknownMessageType(42)));
    }
}
