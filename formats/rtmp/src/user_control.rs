//! User Control messages (message type id 4): a 2-byte event type followed
//! by an event-specific payload.

use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

pub const CSID: u32 = 2;
pub const MESSAGE_STREAM_ID: u32 = 0;
pub const MESSAGE_TYPE_ID: u8 = 4;

#[derive(Debug, Error)]
pub enum UserControlError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown user control event type: {0}")]
    UnknownEventType(u16),
}

pub type UserControlResult<T> = Result<T, UserControlError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserControlEvent {
    StreamBegin { stream_id: u32 },
    StreamEof { stream_id: u32 },
    StreamDry { stream_id: u32 },
    SetBufferLength { stream_id: u32, buffer_length: u32 },
    StreamIsRecorded { stream_id: u32 },
    PingRequest { timestamp: u32 },
    PingResponse { timestamp: u32 },
}

impl UserControlEvent {
    fn event_type(&self) -> u16 {
        match self {
            UserControlEvent::StreamBegin { .. } => 0,
            UserControlEvent::StreamEof { .. } => 1,
            UserControlEvent::StreamDry { .. } => 2,
            UserControlEvent::SetBufferLength { .. } => 3,
            UserControlEvent::StreamIsRecorded { .. } => 4,
            UserControlEvent::PingRequest { .. } => 6,
            UserControlEvent::PingResponse { .. } => 7,
        }
    }

    pub fn read_from(payload: &[u8]) -> UserControlResult<Self> {
        let mut cursor = io::Cursor::new(payload);
        let event_type = cursor.read_u16::<BigEndian>()?;
        match event_type {
            0 => Ok(UserControlEvent::StreamBegin {
                stream_id: cursor.read_u32::<BigEndian>()?,
            }),
            1 => Ok(UserControlEvent::StreamEof {
                stream_id: cursor.read_u32::<BigEndian>()?,
            }),
            2 => Ok(UserControlEvent::StreamDry {
                stream_id: cursor.read_u32::<BigEndian>()?,
            }),
            3 => Ok(UserControlEvent::SetBufferLength {
                stream_id: cursor.read_u32::<BigEndian>()?,
                buffer_length: cursor.read_u32::<BigEndian>()?,
            }),
            4 => Ok(UserControlEvent::StreamIsRecorded {
                stream_id: cursor.read_u32::<BigEndian>()?,
            }),
            6 => Ok(UserControlEvent::PingRequest {
                timestamp: cursor.read_u32::<BigEndian>()?,
            }),
            7 => Ok(UserControlEvent::PingResponse {
                timestamp: cursor.read_u32::<BigEndian>()?,
            }),
            other => Err(UserControlError::UnknownEventType(other)),
        }
    }

    pub fn write_to<W: io::Write>(&self, writer: &mut W) -> UserControlResult<()> {
        writer.write_u16::<BigEndian>(self.event_type())?;
        match *self {
            UserControlEvent::StreamBegin { stream_id }
            | UserControlEvent::StreamEof { stream_id }
            | UserControlEvent::StreamDry { stream_id }
            | UserControlEvent::StreamIsRecorded { stream_id } => {
                writer.write_u32::<BigEndian>(stream_id)?;
            }
            UserControlEvent::SetBufferLength {
                stream_id,
                buffer_length,
            } => {
                writer.write_u32::<BigEndian>(stream_id)?;
                writer.write_u32::<BigEndian>(buffer_length)?;
            }
            UserControlEvent::PingRequest { timestamp }
            | UserControlEvent::PingResponse { timestamp } => {
                writer.write_u32::<BigEndian>(timestamp)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_begin_round_trips() {
        let event = UserControlEvent::StreamBegin { stream_id: 1 };
        let mut buf = Vec::new();
        event.write_to(&mut buf).unwrap();
        assert_eq!(buf, vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(UserControlEvent::read_from(&buf).unwrap(), event);
    }

    #[test]
    fn ping_request_round_trips_into_ping_response_shape() {
        let request = UserControlEvent::PingRequest { timestamp: 123456 };
        let mut buf = Vec::new();
        request.write_to(&mut buf).unwrap();
        assert_eq!(UserControlEvent::read_from(&buf).unwrap(), request);
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = UserControlEvent::read_from(&[0x00, 0x05, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, UserControlError::UnknownEventType(5)));
    }
}
