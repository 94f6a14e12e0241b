//! The three MessagePack-RPC message shapes.

use super::decode::{decode_value, Progress};
use super::encode::{write_array_len, write_integer, write_str, write_value};
use super::value::{Integer, Value};
use crate::{Result, RpcError};
use bytes::{BufMut, BytesMut};

const TAG_REQUEST: u64 = 0;
const TAG_RESPONSE: u64 = 1;
const TAG_NOTIFICATION: u64 = 2;

/// A MessagePack-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: u64,
        method: String,
        args: Vec<Value>,
    },
    Response {
        id: u64,
        /// `None` is encoded as nil.
        error: Option<Value>,
        result: Value,
    },
    Notification {
        method: String,
        args: Vec<Value>,
    },
}

impl Message {
    /// Short kind name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request { .. } => "request",
            Message::Response { .. } => "response",
            Message::Notification { .. } => "notification",
        }
    }

    /// Append the wire encoding of this message to `buf`.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Message::Request { id, method, args } => {
                write_array_len(buf, 4)?;
                write_integer(buf, Integer::from(TAG_REQUEST));
                write_integer(buf, Integer::from(*id));
                write_str(buf, method)?;
                write_args(buf, args)?;
            }
            Message::Response { id, error, result } => {
                write_array_len(buf, 4)?;
                write_integer(buf, Integer::from(TAG_RESPONSE));
                write_integer(buf, Integer::from(*id));
                write_value(buf, error.as_ref().unwrap_or(&Value::Nil))?;
                write_value(buf, result)?;
            }
            Message::Notification { method, args } => {
                write_array_len(buf, 3)?;
                write_integer(buf, Integer::from(TAG_NOTIFICATION));
                write_str(buf, method)?;
                write_args(buf, args)?;
            }
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode one message from the front of `buf`.
    ///
    /// Returns the message and the bytes it consumed, or `None` if `buf`
    /// holds only part of a message.
    pub fn decode(buf: &[u8]) -> Result<Option<(Message, usize)>> {
        match Message::decode_progress(buf)? {
            Progress::Complete(message, used) => Ok(Some((message, used))),
            Progress::NeedAtLeast(_) => Ok(None),
        }
    }

    /// Like [`decode`](Self::decode), but says how long `buf` must grow
    /// before another attempt can succeed.
    pub fn decode_progress(buf: &[u8]) -> Result<Progress<Message>> {
        match decode_value(buf)? {
            Progress::Complete(value, used) => {
                Ok(Progress::Complete(Message::from_value(value)?, used))
            }
            Progress::NeedAtLeast(needed) => Ok(Progress::NeedAtLeast(needed)),
        }
    }

    /// Interpret a decoded value as a message.
    pub fn from_value(value: Value) -> Result<Message> {
        let items = value.into_array().ok_or_else(|| {
            RpcError::protocol("top-level message is not an array")
        })?;

        let tag = items
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::protocol("message tag is not a non-negative integer"))?;

        let mut fields = items.into_iter().skip(1);
        match (tag, fields.len()) {
            (TAG_REQUEST, 3) => {
                let id = take_id(&mut fields)?;
                let method = take_string(&mut fields, "request method")?;
                let args = take_array(&mut fields, "request args")?;
                Ok(Message::Request { id, method, args })
            }
            (TAG_RESPONSE, 3) => {
                let id = take_id(&mut fields)?;
                let error = fields.next().filter(|v| !v.is_nil());
                let result = fields.next().unwrap_or(Value::Nil);
                Ok(Message::Response { id, error, result })
            }
            (TAG_NOTIFICATION, 2) => {
                let method = take_string(&mut fields, "notification method")?;
                let args = take_array(&mut fields, "notification args")?;
                Ok(Message::Notification { method, args })
            }
            (TAG_REQUEST | TAG_RESPONSE | TAG_NOTIFICATION, n) => Err(RpcError::protocol(format!(
                "message with tag {} has {} elements",
                tag,
                n + 1
            ))),
            (other, _) => Err(RpcError::protocol(format!("unknown message tag {}", other))),
        }
    }
}

fn write_args<B: BufMut>(buf: &mut B, args: &[Value]) -> Result<()> {
    write_array_len(buf, args.len())?;
    for arg in args {
        write_value(buf, arg)?;
    }
    Ok(())
}

fn take_id(fields: &mut impl Iterator<Item = Value>) -> Result<u64> {
    fields
        .next()
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::protocol("message id is not a non-negative integer"))
}

fn take_string(fields: &mut impl Iterator<Item = Value>, what: &str) -> Result<String> {
    match fields.next() {
        Some(Value::String(s)) => Ok(s),
        _ => Err(RpcError::protocol(format!("{} is not a string", what))),
    }
}

fn take_array(fields: &mut impl Iterator<Item = Value>, what: &str) -> Result<Vec<Value>> {
    match fields.next() {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(RpcError::protocol(format!("{} is not an array", what))),
    }
}

/// Decode every complete message at the front of `buf`.
///
/// Returns the messages and the number of bytes consumed; anything after
/// that is a partial message the caller keeps for the next read.
pub fn decode_all(buf: &[u8]) -> Result<(Vec<Message>, usize)> {
    let mut messages = Vec::new();
    let mut consumed = 0;
    while let Some((message, used)) = Message::decode(&buf[consumed..])? {
        messages.push(message);
        consumed += used;
    }
    Ok((messages, consumed))
}
