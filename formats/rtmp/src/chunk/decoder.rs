use std::collections::HashMap;

use tokio_util::{
    bytes::{Buf, BytesMut},
    codec::Decoder,
};

use super::{Message, consts, errors::ChunkCodecError};

struct PartialMessage {
    message_type_id: u8,
    message_stream_id: u32,
    timestamp: u32,
    declared_length: u32,
    buffer: Vec<u8>,
}

struct ChunkStreamState {
    last_timestamp: u32,
    last_timestamp_delta: u32,
    last_message_length: u32,
    last_message_type_id: u8,
    last_message_stream_id: u32,
    extended_timestamp_present: bool,
    in_progress: Option<PartialMessage>,
}

impl ChunkStreamState {
    fn new() -> Self {
        Self {
            last_timestamp: 0,
            last_timestamp_delta: 0,
            last_message_length: 0,
            last_message_type_id: 0,
            last_message_stream_id: 0,
            extended_timestamp_present: false,
            in_progress: None,
        }
    }
}

/// Demultiplexes a byte stream into [`Message`]s, one per-csid reassembly
/// buffer at a time. Owns no I/O: it is driven by a [`tokio_util::codec`]
/// `Framed` wrapper (or any caller feeding it `BytesMut`).
pub struct ChunkDecoder {
    streams: HashMap<u32, ChunkStreamState>,
    chunk_size: u32,
    max_message_size: u32,
}

impl ChunkDecoder {
    pub fn new(max_message_size: u32) -> Self {
        Self {
            streams: HashMap::new(),
            chunk_size: consts::DEFAULT_CHUNK_SIZE,
            max_message_size,
        }
    }

    /// Applies a peer `Set Chunk Size`. Takes effect for the next chunk
    /// decoded on any csid; chunks already buffered in flight are unaffected.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size;
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Discards an in-progress reassembly, as directed by an `Abort` message.
    pub fn abort(&mut self, csid: u32) {
        if let Some(state) = self.streams.get_mut(&csid) {
            state.in_progress = None;
        }
    }
}

impl Decoder for ChunkDecoder {
    type Item = Message;
    type Error = ChunkCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ChunkCodecError> {
        loop {
            match try_decode_one_chunk(
                &src[..],
                &mut self.streams,
                self.chunk_size,
                self.max_message_size,
            )? {
                None => return Ok(None),
                Some((consumed, message)) => {
                    src.advance(consumed);
                    if let Some(message) = message {
                        return Ok(Some(message));
                    }
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

fn u24_be(bytes: &[u8]) -> u32 {
    (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32
}

/// Tries to decode exactly one chunk from the front of `src`. Returns
/// `Ok(None)` if `src` does not yet hold a full chunk. On success, returns
/// the number of bytes consumed plus a completed [`Message`] if this chunk
/// happened to be the last one needed to fill its csid's reassembly buffer.
fn try_decode_one_chunk(
    src: &[u8],
    streams: &mut HashMap<u32, ChunkStreamState>,
    chunk_size: u32,
    max_message_size: u32,
) -> Result<Option<(usize, Option<Message>)>, ChunkCodecError> {
    if src.is_empty() {
        return Ok(None);
    }

    let first = src[0];
    let fmt = (first >> 6) & 0b11;
    let low6 = first & 0b0011_1111;

    let (csid, basic_header_len) = match low6 {
        0 => {
            if src.len() < 2 {
                return Ok(None);
            }
            (src[1] as u32 + 64, 2)
        }
        1 => {
            if src.len() < 3 {
                return Ok(None);
            }
            let a = src[1] as u32;
            let b = src[2] as u32;
            (b * 256 + a + 64, 3)
        }
        other => (other as u32, 1),
    };

    let header_field_len = match fmt {
        0 => 11,
        1 => 7,
        2 => 3,
        3 => 0,
        _ => unreachable!("fmt is two bits"),
    };

    if src.len() < basic_header_len + header_field_len {
        return Ok(None);
    }

    if !streams.contains_key(&csid) && fmt != 0 {
        return Err(ChunkCodecError::UnestablishedChunkStream { csid, fmt });
    }
    let state = streams.entry(csid).or_insert_with(ChunkStreamState::new);

    let mut offset = basic_header_len;

    let ts_field = match fmt {
        0 | 1 | 2 => Some(u24_be(&src[offset..offset + 3])),
        _ => None,
    };

    let extended_ts_expected = match fmt {
        0 | 1 | 2 => ts_field == Some(consts::EXTENDED_TIMESTAMP_MARKER),
        _ => state.extended_timestamp_present,
    };

    let total_header_len =
        basic_header_len + header_field_len + if extended_ts_expected { 4 } else { 0 };
    if src.len() < total_header_len {
        return Ok(None);
    }

    let message_length;
    let message_type_id;
    let message_stream_id;

    match fmt {
        0 => {
            message_length = u24_be(&src[offset + 3..offset + 6]);
            message_type_id = src[offset + 6];
            message_stream_id =
                u32::from_le_bytes(src[offset + 7..offset + 11].try_into().unwrap());
            offset += 11;
        }
        1 => {
            message_length = u24_be(&src[offset + 3..offset + 6]);
            message_type_id = src[offset + 6];
            message_stream_id = state.last_message_stream_id;
            offset += 7;
        }
        2 => {
            message_length = state.last_message_length;
            message_type_id = state.last_message_type_id;
            message_stream_id = state.last_message_stream_id;
            offset += 3;
        }
        _ => {
            message_length = state.last_message_length;
            message_type_id = state.last_message_type_id;
            message_stream_id = state.last_message_stream_id;
        }
    }

    let extended_timestamp = if extended_ts_expected {
        let v = u32::from_be_bytes(src[offset..offset + 4].try_into().unwrap());
        offset += 4;
        Some(v)
    } else {
        None
    };

    if message_length > max_message_size {
        return Err(ChunkCodecError::MessageTooLarge {
            declared: message_length,
            max: max_message_size,
        });
    }

    let begins_new_message = fmt != 3 || state.in_progress.is_none();

    let absolute_timestamp = if begins_new_message {
        match fmt {
            0 => extended_timestamp.unwrap_or_else(|| ts_field.unwrap()),
            1 | 2 => {
                let delta = extended_timestamp.unwrap_or_else(|| ts_field.unwrap());
                state.last_timestamp_delta = delta;
                state.last_timestamp.wrapping_add(delta)
            }
            // a type-3 chunk that opens a brand-new message (the previous
            // one on this csid finished) reuses the prior delta verbatim.
            _ => state.last_timestamp.wrapping_add(state.last_timestamp_delta),
        }
    } else {
        state
            .in_progress
            .as_ref()
            .map(|m| m.timestamp)
            .unwrap_or(state.last_timestamp)
    };

    if begins_new_message {
        state.in_progress = Some(PartialMessage {
            message_type_id,
            message_stream_id,
            timestamp: absolute_timestamp,
            declared_length: message_length,
            buffer: Vec::with_capacity(message_length as usize),
        });
    }

    let partial = state.in_progress.as_mut().expect("just initialized above");
    let remaining = partial.declared_length as usize - partial.buffer.len();
    let payload_len = (chunk_size as usize).min(remaining);

    if src.len() < offset + payload_len {
        // nothing has been consumed from `src` yet; `in_progress` staying
        // populated is fine, the next call re-parses this same chunk header.
        return Ok(None);
    }

    partial
        .buffer
        .extend_from_slice(&src[offset..offset + payload_len]);
    offset += payload_len;

    state.last_message_length = message_length;
    state.last_message_type_id = message_type_id;
    state.last_message_stream_id = message_stream_id;
    state.extended_timestamp_present = extended_ts_expected;
    state.last_timestamp = absolute_timestamp;

    let completed = if partial.buffer.len() == partial.declared_length as usize {
        let partial = state.in_progress.take().unwrap();
        Some(Message {
            message_type_id: partial.message_type_id,
            message_stream_id: partial.message_stream_id,
            timestamp: partial.timestamp,
            payload: partial.buffer,
        })
    } else {
        None
    };

    Ok(Some((offset, completed)))
}
