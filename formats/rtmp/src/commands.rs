//! AMF0 command messages (message type id 20): `connect`, `createStream`,
//! `publish`, `play`, `pause`, `deleteStream`, plus the `_result`/`_error`/
//! `onStatus` responses the server sends back.

use amf::Value;
use thiserror::Error;

pub const MESSAGE_TYPE_ID: u8 = 20;
pub const CONNECT_CSID: u32 = 3;
pub const CONNECT_MESSAGE_STREAM_ID: u32 = 0;

pub mod names {
    pub const CONNECT: &str = "connect";
    pub const CREATE_STREAM: &str = "createStream";
    pub const PUBLISH: &str = "publish";
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const DELETE_STREAM: &str = "deleteStream";
    pub const CLOSE_STREAM: &str = "closeStream";
    pub const RESULT: &str = "_result";
    pub const ERROR: &str = "_error";
    pub const ON_STATUS: &str = "onStatus";
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("amf0 decode error: {0}")]
    AmfRead(#[from] amf::errors::AmfReadError),
    #[error("amf0 encode error: {0}")]
    AmfWrite(#[from] amf::errors::AmfWriteError),
    #[error("command message carried no values")]
    Empty,
    #[error("expected the command name as the first value, got {0:?}")]
    MissingCommandName(Value),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` had the wrong AMF0 type")]
    WrongFieldType { field: &'static str },
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect {
        transaction_id: f64,
        app: String,
        tc_url: Option<String>,
        flash_ver: Option<String>,
        object_encoding: Option<f64>,
    },
    CreateStream {
        transaction_id: f64,
    },
    Publish {
        transaction_id: f64,
        publishing_name: String,
        publishing_type: String,
    },
    Play {
        transaction_id: f64,
        stream_name: String,
        start: Option<f64>,
    },
    Pause {
        transaction_id: f64,
        pause_flag: bool,
        milliseconds: Option<f64>,
    },
    DeleteStream {
        transaction_id: f64,
        stream_id: f64,
    },
    /// Client is tearing down its stream and, per the core's dispatch table,
    /// this closes the whole connection rather than just freeing a slot.
    CloseStream {
        transaction_id: f64,
    },
    /// Any command name outside the set above. The connection still owes an
    /// `_error` reply if the transaction id is non-zero; the name and raw
    /// argument list are preserved for logging.
    Unknown {
        name: String,
        transaction_id: f64,
        arguments: Vec<Value>,
    },
}

impl Command {
    pub fn decode(values: Vec<Value>) -> CommandResult<Self> {
        let mut iter = values.into_iter();
        let name = match iter.next() {
            Some(Value::String(name)) => name,
            Some(other) => return Err(CommandError::MissingCommandName(other)),
            None => return Err(CommandError::Empty),
        };
        let transaction_id = iter
            .next()
            .and_then(|v| v.try_as_f64())
            .ok_or(CommandError::MissingField("transactionId"))?;
        let arguments: Vec<Value> = iter.collect();

        match name.as_str() {
            names::CONNECT => {
                let cmd_object = arguments
                    .first()
                    .ok_or(CommandError::MissingField("commandObject"))?;
                let app = cmd_object
                    .object_get("app")
                    .and_then(|v| v.try_as_str())
                    .ok_or(CommandError::MissingField("app"))?
                    .to_owned();
                let tc_url = cmd_object
                    .object_get("tcUrl")
                    .and_then(|v| v.try_as_str())
                    .map(str::to_owned);
                let flash_ver = cmd_object
                    .object_get("flashVer")
                    .and_then(|v| v.try_as_str())
                    .map(str::to_owned);
                let object_encoding = cmd_object.object_get("objectEncoding").and_then(|v| v.try_as_f64());
                Ok(Command::Connect {
                    transaction_id,
                    app,
                    tc_url,
                    flash_ver,
                    object_encoding,
                })
            }
            names::CREATE_STREAM => Ok(Command::CreateStream { transaction_id }),
            names::PUBLISH => {
                let publishing_name = arguments
                    .get(1)
                    .and_then(|v| v.try_as_str())
                    .ok_or(CommandError::MissingField("publishingName"))?
                    .to_owned();
                let publishing_type = arguments
                    .get(2)
                    .and_then(|v| v.try_as_str())
                    .unwrap_or("live")
                    .to_owned();
                Ok(Command::Publish {
                    transaction_id,
                    publishing_name,
                    publishing_type,
                })
            }
            names::PLAY => {
                let stream_name = arguments
                    .get(1)
                    .and_then(|v| v.try_as_str())
                    .ok_or(CommandError::MissingField("streamName"))?
                    .to_owned();
                let start = arguments.get(2).and_then(|v| v.try_as_f64());
                Ok(Command::Play {
                    transaction_id,
                    stream_name,
                    start,
                })
            }
            names::PAUSE => {
                let pause_flag = matches!(arguments.get(1), Some(Value::Boolean(true)));
                let milliseconds = arguments.get(2).and_then(|v| v.try_as_f64());
                Ok(Command::Pause {
                    transaction_id,
                    pause_flag,
                    milliseconds,
                })
            }
            names::DELETE_STREAM => {
                let stream_id = arguments
                    .get(1)
                    .and_then(|v| v.try_as_f64())
                    .ok_or(CommandError::MissingField("streamId"))?;
                Ok(Command::DeleteStream {
                    transaction_id,
                    stream_id,
                })
            }
            names::CLOSE_STREAM => Ok(Command::CloseStream { transaction_id }),
            other => Ok(Command::Unknown {
                name: other.to_owned(),
                transaction_id,
                arguments,
            }),
        }
    }

    pub fn transaction_id(&self) -> f64 {
        match self {
            Command::Connect { transaction_id, .. }
            | Command::CreateStream { transaction_id }
            | Command::Publish { transaction_id, .. }
            | Command::Play { transaction_id, .. }
            | Command::Pause { transaction_id, .. }
            | Command::DeleteStream { transaction_id, .. }
            | Command::CloseStream { transaction_id }
            | Command::Unknown { transaction_id, .. } => *transaction_id,
        }
    }
}

/// Builds the info-object argument common to `_result`/`onStatus` replies:
/// `{level, code, description}`.
pub fn status_object(level: &str, code: &str, description: &str) -> Value {
    Value::Object(vec![
        ("level".to_owned(), Value::String(level.to_owned())),
        ("code".to_owned(), Value::String(code.to_owned())),
        (
            "description".to_owned(),
            Value::String(description.to_owned()),
        ),
    ])
}

pub fn connect_result(transaction_id: f64, fms_version: &str, capabilities: f64) -> Vec<Value> {
    vec![
        Value::String(names::RESULT.to_owned()),
        Value::Number(transaction_id),
        Value::Object(vec![
            ("fmsVer".to_owned(), Value::String(fms_version.to_owned())),
            ("capabilities".to_owned(), Value::Number(capabilities)),
        ]),
        status_object(
            "status",
            "NetConnection.Connect.Success",
            "Connection succeeded.",
        ),
    ]
}

pub fn create_stream_result(transaction_id: f64, stream_id: f64) -> Vec<Value> {
    vec![
        Value::String(names::RESULT.to_owned()),
        Value::Number(transaction_id),
        Value::Null,
        Value::Number(stream_id),
    ]
}

pub fn on_status(level: &str, code: &str, description: &str) -> Vec<Value> {
    vec![
        Value::String(names::ON_STATUS.to_owned()),
        Value::Number(0.0),
        Value::Null,
        status_object(level, code, description),
    ]
}

pub fn error_response(transaction_id: f64, code: &str, description: &str) -> Vec<Value> {
    vec![
        Value::String(names::ERROR.to_owned()),
        Value::Number(transaction_id),
        Value::Null,
        status_object("error", code, description),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_connect() {
        let values = vec![
            Value::String("connect".to_owned()),
            Value::Number(1.0),
            Value::Object(vec![
                ("app".to_owned(), Value::String("live".to_owned())),
                (
                    "tcUrl".to_owned(),
                    Value::String("rtmp://h/live".to_owned()),
                ),
            ]),
        ];
        let cmd = Command::decode(values).unwrap();
        assert_eq!(
            cmd,
            Command::Connect {
                transaction_id: 1.0,
                app: "live".to_owned(),
                tc_url: Some("rtmp://h/live".to_owned()),
                flash_ver: None,
                object_encoding: None,
            }
        );
    }

    #[test]
    fn decodes_publish() {
        let values = vec![
            Value::String("publish".to_owned()),
            Value::Number(3.0),
            Value::Null,
            Value::String("cam1".to_owned()),
            Value::String("live".to_owned()),
        ];
        let cmd = Command::decode(values).unwrap();
        assert_eq!(
            cmd,
            Command::Publish {
                transaction_id: 3.0,
                publishing_name: "cam1".to_owned(),
                publishing_type: "live".to_owned(),
            }
        );
    }

    #[test]
    fn decodes_delete_stream() {
        let values = vec![
            Value::String("deleteStream".to_owned()),
            Value::Number(5.0),
            Value::Null,
            Value::Number(1.0),
        ];
        let cmd = Command::decode(values).unwrap();
        assert_eq!(
            cmd,
            Command::DeleteStream {
                transaction_id: 5.0,
                stream_id: 1.0,
            }
        );
    }

    #[test]
    fn unknown_command_name_is_preserved_not_rejected() {
        let values = vec![
            Value::String("FCPublish".to_owned()),
            Value::Number(0.0),
            Value::Null,
        ];
        let cmd = Command::decode(values).unwrap();
        assert!(matches!(cmd, Command::Unknown { .. }));
    }

    #[test]
    fn connect_missing_app_is_an_error() {
        let values = vec![
            Value::String("connect".to_owned()),
            Value::Number(1.0),
            Value::Object(vec![]),
        ];
        assert!(Command::decode(values).is_err());
    }
}
