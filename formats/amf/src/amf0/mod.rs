use core::time;

pub mod codec;
pub mod reader;
pub mod writer;

pub use reader::Reader;
pub use writer::Writer;

/// AMF0 marker bytes, see the AMF0 spec section 2.
pub mod amf0_marker {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const DATE: u8 = 0x0B;
    pub const LONG_STRING: u8 = 0x0C;
}

/// A decoded AMF0 value. Object keys keep their wire order because some
/// RTMP peers infer positional meaning from it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(Vec<(String, Value)>),
    Null,
    Undefined,
    ECMAArray(Vec<(String, Value)>),
    StrictArray(Vec<Value>),
    Date {
        millis_timestamp: time::Duration,
        time_zone: i16,
    },
    /// Sentinel returned internally by the reader when it hits the
    /// empty-key + 0x09 object terminator; never appears in a decoded tree.
    ObjectEnd,
}

impl Value {
    pub fn try_as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn try_as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn object_get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) | Value::ECMAArray(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }
}
