//! Bridges the raw, type-erased [`crate::chunk::Message`] framing produces
//! with the protocol- and command-level meaning the connection state
//! machine dispatches on.

use std::io;

use amf::Value;
use thiserror::Error;

use crate::{
    chunk,
    commands::{self, Command},
    protocol_control::{self, ProtocolControlMessage},
    user_control::{self, UserControlEvent},
};

pub const AUDIO_MESSAGE_TYPE_ID: u8 = 8;
pub const VIDEO_MESSAGE_TYPE_ID: u8 = 9;
pub const AMF0_DATA_MESSAGE_TYPE_ID: u8 = 18;
pub const AMF3_DATA_MESSAGE_TYPE_ID: u8 = 15;
pub const AMF3_COMMAND_MESSAGE_TYPE_ID: u8 = 17;
pub const AMF0_SHARED_OBJECT_MESSAGE_TYPE_ID: u8 = 19;
pub const AMF3_SHARED_OBJECT_MESSAGE_TYPE_ID: u8 = 16;
pub const AGGREGATE_MESSAGE_TYPE_ID: u8 = 22;

pub const AUDIO_CSID: u32 = 6;
pub const VIDEO_CSID: u32 = 7;
pub const DATA_CSID: u32 = 5;

#[derive(Debug, Error)]
pub enum RtmpMessageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("amf0 decode error: {0}")]
    AmfRead(#[from] amf::errors::AmfReadError),
    #[error("amf0 encode error: {0}")]
    AmfWrite(#[from] amf::errors::AmfWriteError),
    #[error(transparent)]
    ProtocolControl(#[from] protocol_control::ProtocolControlError),
    #[error(transparent)]
    UserControl(#[from] user_control::UserControlError),
    #[error(transparent)]
    Command(#[from] commands::CommandError),
    #[error(
        "message type id {0} is out of scope (AMF3, shared-object and aggregate messages are not supported)"
    )]
    Unsupported(u8),
}

pub type RtmpMessageResult<T> = Result<T, RtmpMessageError>;

/// A [`chunk::Message`] whose payload has been interpreted according to its
/// `message_type_id`.
#[derive(Debug, Clone)]
pub enum RtmpMessageBody {
    ProtocolControl(ProtocolControlMessage),
    UserControl(UserControlEvent),
    Command(Command),
    /// An AMF0 Data message (`@setDataFrame`/`onMetaData` and friends): the
    /// ordered list of AMF0 values making up its body.
    Data(Vec<Value>),
    Audio(Vec<u8>),
    Video(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct RtmpMessage {
    pub message_stream_id: u32,
    pub timestamp: u32,
    pub body: RtmpMessageBody,
}

impl RtmpMessage {
    /// Interprets a reassembled chunk-layer message. Rejects AMF3, shared
    /// object and aggregate message type ids outright, matching the
    /// protocol feature set this server implements.
    pub fn decode(raw: chunk::Message) -> RtmpMessageResult<Self> {
        let body = match raw.message_type_id {
            1 | 2 | 3 | 5 | 6 => RtmpMessageBody::ProtocolControl(
                ProtocolControlMessage::read_from(raw.message_type_id, &raw.payload)?,
            ),
            user_control::MESSAGE_TYPE_ID => {
                RtmpMessageBody::UserControl(UserControlEvent::read_from(&raw.payload)?)
            }
            commands::MESSAGE_TYPE_ID => {
                let values = read_amf0_values(&raw.payload)?;
                RtmpMessageBody::Command(Command::decode(values)?)
            }
            AMF0_DATA_MESSAGE_TYPE_ID => {
                let values = read_amf0_values(&raw.payload)?;
                RtmpMessageBody::Data(values)
            }
            AUDIO_MESSAGE_TYPE_ID => RtmpMessageBody::Audio(raw.payload),
            VIDEO_MESSAGE_TYPE_ID => RtmpMessageBody::Video(raw.payload),
            other => return Err(RtmpMessageError::Unsupported(other)),
        };
        Ok(RtmpMessage {
            message_stream_id: raw.message_stream_id,
            timestamp: raw.timestamp,
            body,
        })
    }
}

fn read_amf0_values(payload: &[u8]) -> RtmpMessageResult<Vec<Value>> {
    let mut reader = amf::amf0::Reader::new(io::Cursor::new(payload));
    Ok(reader.read_all()?)
}

fn write_amf0_values(values: &[Value]) -> RtmpMessageResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut writer = amf::amf0::Writer::new(&mut buf);
    for value in values {
        writer.write(value)?;
    }
    Ok(buf)
}

/// Builds an outbound AMF0 Command message (type 20), e.g. a `_result` or
/// `onStatus` reply built from [`crate::commands`]'s helpers.
pub fn encode_command(
    message_stream_id: u32,
    timestamp: u32,
    values: &[Value],
) -> RtmpMessageResult<chunk::Message> {
    Ok(chunk::Message {
        message_type_id: commands::MESSAGE_TYPE_ID,
        message_stream_id,
        timestamp,
        payload: write_amf0_values(values)?,
    })
}

/// Builds an outbound AMF0 Data message (type 18), e.g. `onMetaData`.
pub fn encode_data(
    message_stream_id: u32,
    timestamp: u32,
    values: &[Value],
) -> RtmpMessageResult<chunk::Message> {
    Ok(chunk::Message {
        message_type_id: AMF0_DATA_MESSAGE_TYPE_ID,
        message_stream_id,
        timestamp,
        payload: write_amf0_values(values)?,
    })
}

pub fn encode_protocol_control(
    message: ProtocolControlMessage,
) -> RtmpMessageResult<chunk::Message> {
    let mut payload = Vec::new();
    message.write_to(&mut payload)?;
    Ok(chunk::Message {
        message_type_id: message.message_type_id(),
        message_stream_id: protocol_control::MESSAGE_STREAM_ID,
        timestamp: 0,
        payload,
    })
}

pub fn encode_user_control(event: UserControlEvent) -> RtmpMessageResult<chunk::Message> {
    let mut payload = Vec::new();
    event.write_to(&mut payload)?;
    Ok(chunk::Message {
        message_type_id: user_control::MESSAGE_TYPE_ID,
        message_stream_id: user_control::MESSAGE_STREAM_ID,
        timestamp: 0,
        payload,
    })
}

pub fn encode_media(
    message_type_id: u8,
    message_stream_id: u32,
    timestamp: u32,
    payload: Vec<u8>,
) -> chunk::Message {
    chunk::Message {
        message_type_id,
        message_stream_id,
        timestamp,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_amf3_and_aggregate_message_types() {
        for type_id in [
            AMF3_DATA_MESSAGE_TYPE_ID,
            AMF3_COMMAND_MESSAGE_TYPE_ID,
            AMF0_SHARED_OBJECT_MESSAGE_TYPE_ID,
            AMF3_SHARED_OBJECT_MESSAGE_TYPE_ID,
            AGGREGATE_MESSAGE_TYPE_ID,
        ] {
            let raw = chunk::Message {
                message_type_id: type_id,
                message_stream_id: 1,
                timestamp: 0,
                payload: vec![],
            };
            let err = RtmpMessage::decode(raw).unwrap_err();
            assert!(matches!(err, RtmpMessageError::Unsupported(_)));
        }
    }

    #[test]
    fn decodes_a_command_message() {
        let values = vec![Value::String("connect".to_owned()), Value::Number(1.0)];
        let raw = encode_command(0, 0, &values).unwrap();
        let message = RtmpMessage::decode(raw).unwrap();
        assert!(matches!(message.body, RtmpMessageBody::Command(_)));
    }

    #[test]
    fn round_trips_protocol_control() {
        let pc = ProtocolControlMessage::SetChunkSize { chunk_size: 4096 };
        let raw = encode_protocol_control(pc).unwrap();
        let message = RtmpMessage::decode(raw).unwrap();
        assert!(matches!(
            message.body,
            RtmpMessageBody::ProtocolControl(ProtocolControlMessage::SetChunkSize {
                chunk_size: 4096
            })
        ));
    }
}
