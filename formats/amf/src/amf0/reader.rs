use core::time;
use std::io;

use byteorder::{BigEndian, ReadBytesExt};

use crate::errors::{AmfReadError, AmfReadResult};

use super::{Value, amf0_marker};

#[derive(Debug)]
pub struct Reader<R> {
    inner: R,
}

impl<R> Reader<R> {
    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R> Reader<R>
where
    R: io::Read,
{
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn read(&mut self) -> AmfReadResult<Option<Value>> {
        let marker = match self.inner.read_u8() {
            Ok(marker) => marker,
            Err(_) => return Ok(None),
        };
        let value = match marker {
            amf0_marker::NUMBER => self.read_number(),
            amf0_marker::BOOLEAN => self.read_boolean(),
            amf0_marker::STRING => self.read_string(),
            amf0_marker::OBJECT => self.read_anonymous_object(),
            amf0_marker::NULL => Ok(Value::Null),
            amf0_marker::UNDEFINED => Ok(Value::Undefined),
            amf0_marker::ECMA_ARRAY => self.read_ecma_array(),
            amf0_marker::OBJECT_END => Ok(Value::ObjectEnd),
            amf0_marker::STRICT_ARRAY => self.read_strict_array(),
            amf0_marker::DATE => self.read_date(),
            amf0_marker::LONG_STRING => self.read_long_string(),
            _ => Err(AmfReadError::Unknown { marker }),
        }?;
        Ok(Some(value))
    }

    /// Reads every value remaining in the stream, stopping at the first
    /// decode error or EOF. Used for command-message argument lists, whose
    /// length isn't known up front.
    pub fn read_all(&mut self) -> AmfReadResult<Vec<Value>> {
        let mut result = Vec::new();
        while let Some(value) = self.read()? {
            result.push(value);
        }
        Ok(result)
    }

    fn read_number(&mut self) -> AmfReadResult<Value> {
        let number = self.inner.read_f64::<BigEndian>()?;
        Ok(Value::Number(number))
    }

    fn read_boolean(&mut self) -> AmfReadResult<Value> {
        let b = self.inner.read_u8()?;
        Ok(Value::Boolean(b != 0))
    }

    fn read_utf8_inner(&mut self, len: usize) -> AmfReadResult<String> {
        let mut buffer = vec![0; len];
        self.inner.read_exact(&mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn read_string(&mut self) -> AmfReadResult<Value> {
        let len = self.inner.read_u16::<BigEndian>()?;
        self.read_utf8_inner(len as usize).map(Value::String)
    }

    fn read_long_string(&mut self) -> AmfReadResult<Value> {
        let len = self.inner.read_u32::<BigEndian>()?;
        self.read_utf8_inner(len as usize).map(Value::String)
    }

    fn read_key_value_pairs_inner(&mut self) -> AmfReadResult<Vec<(String, Value)>> {
        let mut result = Vec::new();
        loop {
            let len = self.inner.read_u16::<BigEndian>()?;
            let key = self.read_utf8_inner(len as usize)?;
            match self.read()? {
                Some(Value::ObjectEnd) if key.is_empty() => break,
                None => return Err(AmfReadError::UnterminatedObject),
                Some(value) => result.push((key, value)),
            }
        }
        Ok(result)
    }

    fn read_anonymous_object(&mut self) -> AmfReadResult<Value> {
        self.read_key_value_pairs_inner().map(Value::Object)
    }

    fn read_ecma_array(&mut self) -> AmfReadResult<Value> {
        let _count_hint = self.inner.read_u32::<BigEndian>()?;
        self.read_key_value_pairs_inner().map(Value::ECMAArray)
    }

    fn read_strict_array(&mut self) -> AmfReadResult<Value> {
        let len = self.inner.read_u32::<BigEndian>()? as usize;
        let values = (0..len)
            .map(|_| match self.read()? {
                None => Err(AmfReadError::UnterminatedObject),
                Some(value) => Ok(value),
            })
            .collect::<AmfReadResult<_>>()?;
        Ok(Value::StrictArray(values))
    }

    fn read_date(&mut self) -> AmfReadResult<Value> {
        let timestamp = self.inner.read_f64::<BigEndian>()?;
        if !timestamp.is_finite() || timestamp.is_sign_negative() {
            return Err(AmfReadError::InvalidDate {
                milliseconds: timestamp,
            });
        }
        // Timezone offset is part of the wire format but carries no defined
        // meaning for playback; read it and move on regardless of its value.
        let time_zone = self.inner.read_i16::<BigEndian>()?;
        Ok(Value::Date {
            time_zone,
            millis_timestamp: time::Duration::from_millis(timestamp as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use core::time;
    use std::io;

    use crate::{
        amf0::Value,
        errors::{AmfReadError, AmfReadResult},
    };

    use super::Reader;

    fn decode(bytes: &[u8]) -> AmfReadResult<Option<Value>> {
        Reader::new(bytes).read()
    }

    #[test]
    fn number() {
        let bytes = [0x00, 0x40, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(decode(&bytes).unwrap().unwrap(), Value::Number(3.5));
    }

    #[test]
    fn truncated_input_yields_eof() {
        let bytes = [0x00, 0x40, 0x0c];
        let err = decode(&bytes).unwrap_err();
        match err {
            AmfReadError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected io eof, got {:?}", other),
        }
    }

    #[test]
    fn boolean() {
        assert_eq!(decode(&[0x01, 0x01]).unwrap().unwrap(), Value::Boolean(true));
        assert_eq!(
            decode(&[0x01, 0x00]).unwrap().unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn string() {
        let mut bytes = vec![0x02, 0x00, 0x05];
        bytes.extend_from_slice(b"hello");
        assert_eq!(
            decode(&bytes).unwrap().unwrap(),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn object_round_trips_order_and_terminates() {
        let mut bytes = vec![0x03];
        bytes.extend_from_slice(&[0x00, 0x03]);
        bytes.extend_from_slice(b"foo");
        bytes.extend_from_slice(&[0x02, 0x00, 0x03]);
        bytes.extend_from_slice(b"baz");
        bytes.extend_from_slice(&[0x00, 0x00, 0x09]);
        assert_eq!(
            decode(&bytes).unwrap().unwrap(),
            Value::Object(vec![("foo".to_string(), Value::String("baz".to_string()))])
        );
    }

    #[test]
    fn unterminated_object_is_an_error() {
        let mut bytes = vec![0x03];
        bytes.extend_from_slice(&[0x00, 0x03]);
        bytes.extend_from_slice(b"foo");
        bytes.extend_from_slice(&[0x05]); // Null, then EOF, never an OBJECT_END
        assert!(matches!(
            decode(&bytes),
            Err(AmfReadError::UnterminatedObject)
        ));
    }

    #[test]
    fn null_and_undefined() {
        assert_eq!(decode(&[0x05]).unwrap().unwrap(), Value::Null);
        assert_eq!(decode(&[0x06]).unwrap().unwrap(), Value::Undefined);
    }

    #[test]
    fn ecma_array() {
        let mut bytes = vec![0x08, 0x00, 0x00, 0x00, 0x01];
        bytes.extend_from_slice(&[0x00, 0x01]);
        bytes.extend_from_slice(b"a");
        bytes.extend_from_slice(&[0x00]); // Number marker
        bytes.extend_from_slice(&1.0f64.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00, 0x09]);
        assert_eq!(
            decode(&bytes).unwrap().unwrap(),
            Value::ECMAArray(vec![("a".to_string(), Value::Number(1.0))])
        );
    }

    #[test]
    fn strict_array() {
        let mut bytes = vec![0x0A, 0x00, 0x00, 0x00, 0x02];
        bytes.push(0x00);
        bytes.extend_from_slice(&1.0f64.to_be_bytes());
        bytes.push(0x00);
        bytes.extend_from_slice(&2.0f64.to_be_bytes());
        assert_eq!(
            decode(&bytes).unwrap().unwrap(),
            Value::StrictArray(vec![Value::Number(1.0), Value::Number(2.0)])
        );
    }

    #[test]
    fn date_ignores_nonzero_timezone() {
        let mut bytes = vec![0x0B];
        bytes.extend_from_slice(&1_590_796_800_000.0f64.to_be_bytes());
        bytes.extend_from_slice(&1i16.to_be_bytes());
        assert_eq!(
            decode(&bytes).unwrap().unwrap(),
            Value::Date {
                time_zone: 1,
                millis_timestamp: time::Duration::from_millis(1_590_796_800_000)
            }
        );
    }

    #[test]
    fn date() {
        let mut bytes = vec![0x0B];
        bytes.extend_from_slice(&1_590_796_800_000.0f64.to_be_bytes());
        bytes.extend_from_slice(&0i16.to_be_bytes());
        assert_eq!(
            decode(&bytes).unwrap().unwrap(),
            Value::Date {
                time_zone: 0,
                millis_timestamp: time::Duration::from_millis(1_590_796_800_000)
            }
        );
    }

    #[test]
    fn unknown_marker() {
        assert!(matches!(
            decode(&[0xFF]),
            Err(AmfReadError::Unknown { marker: 0xFF })
        ));
    }
}
