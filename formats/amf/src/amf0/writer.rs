use core::time;
use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use crate::errors::{AmfWriteError, AmfWriteResult};

use super::{Value, amf0_marker};

pub struct Writer<W> {
    inner: W,
}

impl<W: io::Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write(&mut self, value: &Value) -> AmfWriteResult {
        match value {
            Value::Number(n) => Self::write_number(&mut self.inner, *n),
            Value::Boolean(b) => Self::write_boolean(&mut self.inner, *b),
            Value::String(s) => Self::write_string(&mut self.inner, s),
            Value::Object(entries) => Self::write_object(&mut self.inner, entries),
            Value::Null => Self::write_null(&mut self.inner),
            Value::Undefined => Self::write_undefined(&mut self.inner),
            Value::ECMAArray(entries) => Self::write_ecma_array(&mut self.inner, entries),
            Value::StrictArray(values) => Self::write_strict_array(&mut self.inner, values),
            Value::Date {
                time_zone,
                millis_timestamp,
            } => Self::write_date(&mut self.inner, millis_timestamp, *time_zone),
            Value::ObjectEnd => Self::write_object_end(&mut self.inner),
        }
    }

    fn write_number(writer: &mut W, v: f64) -> AmfWriteResult {
        writer.write_u8(amf0_marker::NUMBER)?;
        writer.write_f64::<BigEndian>(v)?;
        Ok(())
    }

    fn write_boolean(writer: &mut W, v: bool) -> AmfWriteResult {
        writer.write_u8(amf0_marker::BOOLEAN)?;
        writer.write_u8(v as u8)?;
        Ok(())
    }

    fn write_short_string_inner(writer: &mut W, v: &str) -> AmfWriteResult {
        if v.len() > 0xFFFF {
            return Err(AmfWriteError::SizeOutOfRange { value: v.len() });
        }
        writer.write_u16::<BigEndian>(v.len() as u16)?;
        writer.write_all(v.as_bytes())?;
        Ok(())
    }

    fn write_long_string_inner(writer: &mut W, v: &str) -> AmfWriteResult {
        writer.write_u32::<BigEndian>(v.len() as u32)?;
        writer.write_all(v.as_bytes())?;
        Ok(())
    }

    fn write_string(writer: &mut W, v: &str) -> AmfWriteResult {
        if v.len() <= 0xFFFF {
            writer.write_u8(amf0_marker::STRING)?;
            Self::write_short_string_inner(writer, v)
        } else {
            writer.write_u8(amf0_marker::LONG_STRING)?;
            Self::write_long_string_inner(writer, v)
        }
    }

    fn write_pairs_inner(writer: &mut W, entries: &[(String, Value)]) -> AmfWriteResult {
        for (key, value) in entries {
            Self::write_short_string_inner(writer, key)?;
            Writer::new(&mut *writer).write(value)?;
        }
        writer.write_u16::<BigEndian>(0)?;
        writer.write_u8(amf0_marker::OBJECT_END)?;
        Ok(())
    }

    fn write_object(writer: &mut W, entries: &[(String, Value)]) -> AmfWriteResult {
        writer.write_u8(amf0_marker::OBJECT)?;
        Self::write_pairs_inner(writer, entries)
    }

    fn write_null(writer: &mut W) -> AmfWriteResult {
        writer.write_u8(amf0_marker::NULL)?;
        Ok(())
    }

    fn write_undefined(writer: &mut W) -> AmfWriteResult {
        writer.write_u8(amf0_marker::UNDEFINED)?;
        Ok(())
    }

    fn write_ecma_array(writer: &mut W, entries: &[(String, Value)]) -> AmfWriteResult {
        if entries.len() > u32::MAX as usize {
            return Err(AmfWriteError::SizeOutOfRange {
                value: entries.len(),
            });
        }
        writer.write_u8(amf0_marker::ECMA_ARRAY)?;
        writer.write_u32::<BigEndian>(entries.len() as u32)?;
        Self::write_pairs_inner(writer, entries)
    }

    fn write_object_end(writer: &mut W) -> AmfWriteResult {
        writer.write_u8(amf0_marker::OBJECT_END)?;
        Ok(())
    }

    fn write_strict_array(writer: &mut W, values: &[Value]) -> AmfWriteResult {
        if values.len() > u32::MAX as usize {
            return Err(AmfWriteError::SizeOutOfRange {
                value: values.len(),
            });
        }
        writer.write_u8(amf0_marker::STRICT_ARRAY)?;
        writer.write_u32::<BigEndian>(values.len() as u32)?;
        for v in values {
            Writer::new(&mut *writer).write(v)?;
        }
        Ok(())
    }

    fn write_date(writer: &mut W, date_time: &time::Duration, time_zone: i16) -> AmfWriteResult {
        writer.write_u8(amf0_marker::DATE)?;
        writer.write_f64::<BigEndian>(date_time.as_millis() as f64)?;
        writer.write_i16::<BigEndian>(time_zone)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::time;

    use crate::amf0::Value;

    use super::Writer;

    macro_rules! encode {
        ($value:expr) => {{
            let mut buf = Vec::new();
            Writer::new(&mut buf).write(&$value).unwrap();
            buf
        }};
    }

    #[test]
    fn number() {
        let mut expected = vec![0x00];
        expected.extend_from_slice(&3.5f64.to_be_bytes());
        assert_eq!(encode!(Value::Number(3.5)), expected);
    }

    #[test]
    fn boolean() {
        assert_eq!(encode!(Value::Boolean(true)), vec![0x01, 0x01]);
        assert_eq!(encode!(Value::Boolean(false)), vec![0x01, 0x00]);
    }

    #[test]
    fn string() {
        let mut expected = vec![0x02, 0x00, 0x05];
        expected.extend_from_slice(b"hello");
        assert_eq!(encode!(Value::String("hello".to_string())), expected);
    }

    #[test]
    fn object_terminates_with_empty_key_and_marker() {
        let pairs = vec![("foo".to_string(), Value::String("baz".to_string()))];
        let mut expected = vec![0x03, 0x00, 0x03];
        expected.extend_from_slice(b"foo");
        expected.extend_from_slice(&[0x02, 0x00, 0x03]);
        expected.extend_from_slice(b"baz");
        expected.extend_from_slice(&[0x00, 0x00, 0x09]);
        assert_eq!(encode!(Value::Object(pairs)), expected);
    }

    #[test]
    fn null() {
        assert_eq!(encode!(Value::Null), vec![0x05]);
    }

    #[test]
    fn undefined() {
        assert_eq!(encode!(Value::Undefined), vec![0x06]);
    }

    #[test]
    fn ecma_array_emits_count_hint_before_pairs() {
        let arr = vec![("a".to_string(), Value::Number(1.0))];
        let mut expected = vec![0x08, 0x00, 0x00, 0x00, 0x01];
        expected.extend_from_slice(&[0x00, 0x01]);
        expected.extend_from_slice(b"a");
        expected.push(0x00);
        expected.extend_from_slice(&1.0f64.to_be_bytes());
        expected.extend_from_slice(&[0x00, 0x00, 0x09]);
        assert_eq!(encode!(Value::ECMAArray(arr)), expected);
    }

    #[test]
    fn strict_array() {
        let arr = vec![Value::Number(1.0), Value::Number(2.0)];
        let mut expected = vec![0x0A, 0x00, 0x00, 0x00, 0x02];
        expected.push(0x00);
        expected.extend_from_slice(&1.0f64.to_be_bytes());
        expected.push(0x00);
        expected.extend_from_slice(&2.0f64.to_be_bytes());
        assert_eq!(encode!(Value::StrictArray(arr)), expected);
    }

    #[test]
    fn date() {
        let mut expected = vec![0x0B];
        expected.extend_from_slice(&1_590_796_800_000.0f64.to_be_bytes());
        expected.extend_from_slice(&0i16.to_be_bytes());
        assert_eq!(
            encode!(Value::Date {
                time_zone: 0,
                millis_timestamp: time::Duration::from_millis(1_590_796_800_000)
            }),
            expected
        );
    }

    #[test]
    fn long_string_used_past_short_string_limit() {
        let long = "a".repeat(0x10013);
        let encoded = encode!(Value::String(long.clone()));
        assert_eq!(encoded[0], 0x0C);
        let decoded = super::super::reader::Reader::new(&encoded[..])
            .read()
            .unwrap()
            .unwrap();
        assert_eq!(decoded, Value::String(long));
    }

    #[test]
    fn round_trip() {
        let values = vec![
            Value::Number(42.0),
            Value::Boolean(true),
            Value::String("hello".to_string()),
            Value::Object(vec![
                ("a".to_string(), Value::Number(1.0)),
                ("b".to_string(), Value::Null),
            ]),
            Value::Undefined,
            Value::StrictArray(vec![Value::Number(1.0), Value::Number(2.0)]),
        ];
        for value in values {
            let mut buf = Vec::new();
            Writer::new(&mut buf).write(&value).unwrap();
            let decoded = super::super::reader::Reader::new(&buf[..])
                .read()
                .unwrap()
                .unwrap();
            assert_eq!(decoded, value);
        }
    }
}
