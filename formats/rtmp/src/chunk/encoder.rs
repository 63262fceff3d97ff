use std::collections::HashMap;

use tokio_util::bytes::{BufMut, BytesMut};

use super::{Message, consts, errors::ChunkCodecError};

struct EncodeStreamState {
    last_timestamp: u32,
    last_message_length: u32,
    last_message_type_id: u8,
    last_message_stream_id: u32,
}

/// Chops outbound [`Message`]s into chunks on a given csid, picking the
/// smallest header fmt that preserves semantics (reusing message-stream-id,
/// length and type from the csid's previous message wherever possible).
pub struct ChunkEncoder {
    chunk_size: u32,
    streams: HashMap<u32, EncodeStreamState>,
}

impl ChunkEncoder {
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size,
            streams: HashMap::new(),
        }
    }

    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size;
    }

    pub fn encode_message(
        &mut self,
        csid: u32,
        message: &Message,
        dst: &mut BytesMut,
    ) -> Result<(), ChunkCodecError> {
        let message_length = message.payload.len() as u32;
        let prior = self.streams.get(&csid);

        let (fmt, timestamp_field) = match prior {
            None => (0u8, message.timestamp),
            Some(s) if s.last_message_stream_id != message.message_stream_id => {
                (0u8, message.timestamp)
            }
            Some(s) if s.last_message_length != message_length
                || s.last_message_type_id != message.message_type_id =>
            {
                (1u8, message.timestamp.wrapping_sub(s.last_timestamp))
            }
            Some(s) => (2u8, message.timestamp.wrapping_sub(s.last_timestamp)),
        };

        write_basic_header(dst, fmt, csid);

        let use_extended = timestamp_field >= consts::EXTENDED_TIMESTAMP_MARKER;
        let ts_field_value = if use_extended {
            consts::EXTENDED_TIMESTAMP_MARKER
        } else {
            timestamp_field
        };

        match fmt {
            0 => {
                dst.put_uint(ts_field_value as u64, 3);
                dst.put_uint(message_length as u64, 3);
                dst.put_u8(message.message_type_id);
                dst.put_u32_le(message.message_stream_id);
            }
            1 => {
                dst.put_uint(ts_field_value as u64, 3);
                dst.put_uint(message_length as u64, 3);
                dst.put_u8(message.message_type_id);
            }
            2 => {
                dst.put_uint(ts_field_value as u64, 3);
            }
            _ => unreachable!("only fmt 0/1/2 are ever chosen here"),
        }
        if use_extended {
            dst.put_u32(timestamp_field);
        }

        let mut remaining = &message.payload[..];
        loop {
            let take = (self.chunk_size as usize).min(remaining.len());
            dst.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            if remaining.is_empty() {
                break;
            }
            write_basic_header(dst, 3, csid);
            if use_extended {
                dst.put_u32(timestamp_field);
            }
        }

        self.streams.insert(
            csid,
            EncodeStreamState {
                last_timestamp: message.timestamp,
                last_message_length: message_length,
                last_message_type_id: message.message_type_id,
                last_message_stream_id: message.message_stream_id,
            },
        );

        Ok(())
    }
}

fn write_basic_header(dst: &mut BytesMut, fmt: u8, csid: u32) {
    if csid < 64 {
        dst.put_u8((fmt << 6) | csid as u8);
    } else if csid < 320 {
        dst.put_u8(fmt << 6);
        dst.put_u8((csid - 64) as u8);
    } else {
        dst.put_u8((fmt << 6) | 1);
        let v = csid - 64;
        dst.put_u8((v & 0xFF) as u8);
        dst.put_u8((v >> 8) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::decoder::ChunkDecoder;
    use tokio_util::codec::Decoder;

    fn msg(type_id: u8, msid: u32, ts: u32, payload: Vec<u8>) -> Message {
        Message {
            message_type_id: type_id,
            message_stream_id: msid,
            timestamp: ts,
            payload,
        }
    }

    #[test]
    fn round_trips_a_single_chunk_message() {
        let mut encoder = ChunkEncoder::new(consts::DEFAULT_CHUNK_SIZE);
        let mut buf = BytesMut::new();
        let m = msg(20, 0, 1000, vec![1, 2, 3, 4, 5]);
        encoder.encode_message(3, &m, &mut buf).unwrap();

        let mut decoder = ChunkDecoder::new(consts::DEFAULT_MAX_MESSAGE_SIZE);
        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn round_trips_a_message_spanning_multiple_chunks() {
        let mut encoder = ChunkEncoder::new(128);
        let mut buf = BytesMut::new();
        let payload = vec![7u8; 400];
        let m = msg(9, 1, 500, payload);
        encoder.encode_message(6, &m, &mut buf).unwrap();

        let mut decoder = ChunkDecoder::new(consts::DEFAULT_MAX_MESSAGE_SIZE);
        decoder.set_chunk_size(128);
        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn second_message_on_same_csid_uses_delta_compression() {
        let mut encoder = ChunkEncoder::new(consts::DEFAULT_CHUNK_SIZE);
        let mut buf = BytesMut::new();
        let first = msg(9, 1, 1000, vec![0xAA; 10]);
        let second = msg(9, 1, 1033, vec![0xBB; 10]);
        encoder.encode_message(6, &first, &mut buf).unwrap();
        encoder.encode_message(6, &second, &mut buf).unwrap();

        let mut decoder = ChunkDecoder::new(consts::DEFAULT_MAX_MESSAGE_SIZE);
        let a = decoder.decode(&mut buf).unwrap().unwrap();
        let b = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(a, first);
        assert_eq!(b, second);
    }

    #[test]
    fn extended_timestamp_round_trips() {
        let mut encoder = ChunkEncoder::new(consts::DEFAULT_CHUNK_SIZE);
        let mut buf = BytesMut::new();
        let m = msg(18, 0, 0x0100_0000, vec![9, 9, 9]);
        encoder.encode_message(3, &m, &mut buf).unwrap();

        let mut decoder = ChunkDecoder::new(consts::DEFAULT_MAX_MESSAGE_SIZE);
        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn fmt_other_than_zero_on_unestablished_csid_is_a_protocol_error() {
        let mut decoder = ChunkDecoder::new(consts::DEFAULT_MAX_MESSAGE_SIZE);
        // basic header byte: fmt=1 (01), csid=7 (000111) -> 0b01_000111
        let mut buf = BytesMut::from(&[0b0100_0111u8, 0, 0, 0][..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            ChunkCodecError::UnestablishedChunkStream { csid: 7, fmt: 1 }
        ));
    }
}
