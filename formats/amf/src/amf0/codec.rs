use tokio_util::{
    bytes::{Buf, BufMut, BytesMut},
    codec::{Decoder, Encoder},
};

use crate::errors::{AmfReadError, AmfWriteError};

use super::{Reader, Value, Writer};

pub struct Amf0ValueCodec;

impl Decoder for Amf0ValueCodec {
    type Error = AmfReadError;
    type Item = Value;
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Reader::new(src.reader()).read()
    }
}

impl Encoder<Value> for Amf0ValueCodec {
    type Error = AmfWriteError;
    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Writer::new(dst.writer()).write(&item)
    }
}
