//! MessagePack encoding.
//!
//! Every value is written in the smallest form that round-trips it.

use super::marker;
use super::value::{Integer, Value};
use crate::{Result, RpcError};
use bytes::BufMut;

/// Append the encoding of `value` to `buf`.
pub fn write_value<B: BufMut>(buf: &mut B, value: &Value) -> Result<()> {
    match value {
        Value::Nil => buf.put_u8(marker::NIL),
        Value::Boolean(false) => buf.put_u8(marker::FALSE),
        Value::Boolean(true) => buf.put_u8(marker::TRUE),
        Value::Integer(n) => write_integer(buf, *n),
        Value::F32(n) => {
            buf.put_u8(marker::F32);
            buf.put_f32(*n);
        }
        Value::F64(n) => {
            buf.put_u8(marker::F64);
            buf.put_f64(*n);
        }
        Value::String(s) => write_str(buf, s)?,
        Value::Binary(bytes) => write_bin(buf, bytes)?,
        Value::Array(items) => {
            write_array_len(buf, items.len())?;
            for item in items {
                write_value(buf, item)?;
            }
        }
        Value::Map(entries) => {
            write_map_len(buf, entries.len())?;
            for (k, v) in entries {
                write_value(buf, k)?;
                write_value(buf, v)?;
            }
        }
        Value::Ext(ty, data) => write_ext(buf, *ty, data)?,
    }
    Ok(())
}

pub fn write_integer<B: BufMut>(buf: &mut B, n: Integer) {
    if let Some(u) = n.as_u64() {
        write_uint(buf, u);
    } else if let Some(i) = n.as_i64() {
        write_negative(buf, i);
    }
}

fn write_uint<B: BufMut>(buf: &mut B, n: u64) {
    if n <= 0x7f {
        buf.put_u8(n as u8);
    } else if n <= u8::MAX as u64 {
        buf.put_u8(marker::UINT8);
        buf.put_u8(n as u8);
    } else if n <= u16::MAX as u64 {
        buf.put_u8(marker::UINT16);
        buf.put_u16(n as u16);
    } else if n <= u32::MAX as u64 {
        buf.put_u8(marker::UINT32);
        buf.put_u32(n as u32);
    } else {
        buf.put_u8(marker::UINT64);
        buf.put_u64(n);
    }
}

fn write_negative<B: BufMut>(buf: &mut B, n: i64) {
    if n >= -32 {
        // Negative fixint: 0xe0..=0xff is the two's complement byte itself.
        buf.put_i8(n as i8);
    } else if n >= i8::MIN as i64 {
        buf.put_u8(marker::INT8);
        buf.put_i8(n as i8);
    } else if n >= i16::MIN as i64 {
        buf.put_u8(marker::INT16);
        buf.put_i16(n as i16);
    } else if n >= i32::MIN as i64 {
        buf.put_u8(marker::INT32);
        buf.put_i32(n as i32);
    } else {
        buf.put_u8(marker::INT64);
        buf.put_i64(n);
    }
}

fn len_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        RpcError::malformed(format!("{} length {} exceeds u32::MAX", what, len))
    })
}

pub fn write_str<B: BufMut>(buf: &mut B, s: &str) -> Result<()> {
    let len = len_u32(s.len(), "string")?;
    if len <= 31 {
        buf.put_u8(marker::FIXSTR | len as u8);
    } else if len <= u8::MAX as u32 {
        buf.put_u8(marker::STR8);
        buf.put_u8(len as u8);
    } else if len <= u16::MAX as u32 {
        buf.put_u8(marker::STR16);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(marker::STR32);
        buf.put_u32(len);
    }
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn write_bin<B: BufMut>(buf: &mut B, bytes: &[u8]) -> Result<()> {
    let len = len_u32(bytes.len(), "binary")?;
    if len <= u8::MAX as u32 {
        buf.put_u8(marker::BIN8);
        buf.put_u8(len as u8);
    } else if len <= u16::MAX as u32 {
        buf.put_u8(marker::BIN16);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(marker::BIN32);
        buf.put_u32(len);
    }
    buf.put_slice(bytes);
    Ok(())
}

pub fn write_array_len<B: BufMut>(buf: &mut B, len: usize) -> Result<()> {
    let len = len_u32(len, "array")?;
    if len <= 15 {
        buf.put_u8(marker::FIXARRAY | len as u8);
    } else if len <= u16::MAX as u32 {
        buf.put_u8(marker::ARRAY16);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(marker::ARRAY32);
        buf.put_u32(len);
    }
    Ok(())
}

fn write_map_len<B: BufMut>(buf: &mut B, len: usize) -> Result<()> {
    let len = len_u32(len, "map")?;
    if len <= 15 {
        buf.put_u8(marker::FIXMAP | len as u8);
    } else if len <= u16::MAX as u32 {
        buf.put_u8(marker::MAP16);
        buf.put_u16(len as u16);
    } else {
        buf.put_u8(marker::MAP32);
        buf.put_u32(len);
    }
    Ok(())
}

fn write_ext<B: BufMut>(buf: &mut B, ty: i8, data: &[u8]) -> Result<()> {
    let len = len_u32(data.len(), "ext")?;
    match len {
        1 => buf.put_u8(marker::FIXEXT1),
        2 => buf.put_u8(marker::FIXEXT2),
        4 => buf.put_u8(marker::FIXEXT4),
        8 => buf.put_u8(marker::FIXEXT8),
        16 => buf.put_u8(marker::FIXEXT16),
        n if n <= u8::MAX as u32 => {
            buf.put_u8(marker::EXT8);
            buf.put_u8(n as u8);
        }
        n if n <= u16::MAX as u32 => {
            buf.put_u8(marker::EXT16);
            buf.put_u16(n as u16);
        }
        n => {
            buf.put_u8(marker::EXT32);
            buf.put_u32(n);
        }
    }
    buf.put_i8(ty);
    buf.put_slice(data);
    Ok(())
}
