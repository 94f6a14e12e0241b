//! Resumable MessagePack decoding.
//!
//! Decoding distinguishes "not enough bytes yet" from "these bytes are not
//! MessagePack". The first is a normal condition on a stream and surfaces as
//! `Ok(None)`; the second is always an error. No value is ever guessed.

use super::marker;
use super::value::{Integer, Value};
use crate::config::RpcConfig;
use crate::{Result, RpcError};

#[derive(Debug)]
enum DecodeError {
    /// The buffer must hold at least this many bytes before retrying.
    Incomplete(usize),
    Malformed(String),
}

type Step<T> = std::result::Result<T, DecodeError>;

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Step<&'a [u8]> {
        let end = self.pos.saturating_add(n);
        let bytes = self.buf.get(self.pos..end).ok_or(DecodeError::Incomplete(end))?;
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Step<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Step<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Step<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    fn u32(&mut self) -> Step<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    fn u64(&mut self) -> Step<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Result of decoding from a buffer that may hold only part of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress<T> {
    /// The decoded item and the number of bytes it occupied.
    Complete(T, usize),
    /// Lower bound on the buffer length needed before decoding can succeed.
    NeedAtLeast(usize),
}

/// Decode one value from the front of `buf`, reporting how much more is
/// needed when it is only a prefix.
pub fn decode_value(buf: &[u8]) -> Result<Progress<Value>> {
    let mut cursor = Cursor { buf, pos: 0 };
    match read_at(&mut cursor, 0) {
        Ok(value) => Ok(Progress::Complete(value, cursor.pos)),
        Err(DecodeError::Incomplete(needed)) => Ok(Progress::NeedAtLeast(needed)),
        Err(DecodeError::Malformed(message)) => Err(RpcError::malformed(message)),
    }
}

/// Decode one value from the front of `buf`.
///
/// Returns the value and the number of bytes it occupied, or `None` when
/// `buf` holds only a prefix of a value.
pub fn read_value(buf: &[u8]) -> Result<Option<(Value, usize)>> {
    match decode_value(buf)? {
        Progress::Complete(value, used) => Ok(Some((value, used))),
        Progress::NeedAtLeast(_) => Ok(None),
    }
}

/// Decode a buffer that must contain exactly one complete value.
///
/// Used for payloads that are themselves MessagePack, such as the body of a
/// Neovim handle ext value.
pub fn read_exact_value(buf: &[u8]) -> Result<Value> {
    match read_value(buf)? {
        Some((value, used)) if used == buf.len() => Ok(value),
        Some((_, used)) => Err(RpcError::malformed(format!(
            "{} trailing bytes after value",
            buf.len() - used
        ))),
        None => Err(RpcError::malformed("truncated value")),
    }
}

fn read_at(cur: &mut Cursor<'_>, depth: usize) -> Step<Value> {
    if depth > RpcConfig::MAX_VALUE_DEPTH {
        return Err(DecodeError::Malformed(format!(
            "value nesting exceeds depth {}",
            RpcConfig::MAX_VALUE_DEPTH
        )));
    }

    let m = cur.u8()?;
    let value = match m {
        0x00..=0x7f => Value::Integer(Integer::from(m)),
        0x80..=0x8f => read_map(cur, (m & 0x0f) as usize, depth)?,
        0x90..=0x9f => read_array(cur, (m & 0x0f) as usize, depth)?,
        0xa0..=0xbf => read_str(cur, (m & 0x1f) as usize)?,
        marker::NIL => Value::Nil,
        marker::FALSE => Value::Boolean(false),
        marker::TRUE => Value::Boolean(true),
        marker::BIN8 => {
            let len = cur.u8()? as usize;
            Value::Binary(cur.take(len)?.to_vec())
        }
        marker::BIN16 => {
            let len = cur.u16()? as usize;
            Value::Binary(cur.take(len)?.to_vec())
        }
        marker::BIN32 => {
            let len = cur.u32()? as usize;
            Value::Binary(cur.take(len)?.to_vec())
        }
        marker::EXT8 => {
            let len = cur.u8()? as usize;
            read_ext(cur, len)?
        }
        marker::EXT16 => {
            let len = cur.u16()? as usize;
            read_ext(cur, len)?
        }
        marker::EXT32 => {
            let len = cur.u32()? as usize;
            read_ext(cur, len)?
        }
        marker::F32 => Value::F32(f32::from_bits(cur.u32()?)),
        marker::F64 => Value::F64(f64::from_bits(cur.u64()?)),
        marker::UINT8 => Value::from(cur.u8()?),
        marker::UINT16 => Value::from(cur.u16()?),
        marker::UINT32 => Value::from(cur.u32()?),
        marker::UINT64 => Value::from(cur.u64()?),
        marker::INT8 => Value::from(cur.u8()? as i8),
        marker::INT16 => Value::from(cur.u16()? as i16),
        marker::INT32 => Value::from(cur.u32()? as i32),
        marker::INT64 => Value::from(cur.u64()? as i64),
        marker::FIXEXT1 => read_ext(cur, 1)?,
        marker::FIXEXT2 => read_ext(cur, 2)?,
        marker::FIXEXT4 => read_ext(cur, 4)?,
        marker::FIXEXT8 => read_ext(cur, 8)?,
        marker::FIXEXT16 => read_ext(cur, 16)?,
        marker::STR8 => {
            let len = cur.u8()? as usize;
            read_str(cur, len)?
        }
        marker::STR16 => {
            let len = cur.u16()? as usize;
            read_str(cur, len)?
        }
        marker::STR32 => {
            let len = cur.u32()? as usize;
            read_str(cur, len)?
        }
        marker::ARRAY16 => {
            let len = cur.u16()? as usize;
            read_array(cur, len, depth)?
        }
        marker::ARRAY32 => {
            let len = cur.u32()? as usize;
            read_array(cur, len, depth)?
        }
        marker::MAP16 => {
            let len = cur.u16()? as usize;
            read_map(cur, len, depth)?
        }
        marker::MAP32 => {
            let len = cur.u32()? as usize;
            read_map(cur, len, depth)?
        }
        0xe0..=0xff => Value::from(m as i8),
        _ => {
            return Err(DecodeError::Malformed(format!(
                "reserved marker byte 0x{:02x} at offset {}",
                m,
                cur.pos - 1
            )))
        }
    };
    Ok(value)
}

fn read_str(cur: &mut Cursor<'_>, len: usize) -> Step<Value> {
    let start = cur.pos;
    let bytes = cur.take(len)?;
    let s = std::str::from_utf8(bytes).map_err(|e| {
        DecodeError::Malformed(format!("invalid UTF-8 in string at offset {}: {}", start, e))
    })?;
    Ok(Value::String(s.to_string()))
}

fn read_array(cur: &mut Cursor<'_>, len: usize, depth: usize) -> Step<Value> {
    // Every element is at least one byte; never trust the header for capacity.
    let mut items = Vec::with_capacity(len.min(cur.remaining()));
    for _ in 0..len {
        items.push(read_at(cur, depth + 1)?);
    }
    Ok(Value::Array(items))
}

fn read_map(cur: &mut Cursor<'_>, len: usize, depth: usize) -> Step<Value> {
    let mut entries = Vec::with_capacity(len.min(cur.remaining() / 2));
    for _ in 0..len {
        let key = read_at(cur, depth + 1)?;
        let value = read_at(cur, depth + 1)?;
        entries.push((key, value));
    }
    Ok(Value::Map(entries))
}

fn read_ext(cur: &mut Cursor<'_>, len: usize) -> Step<Value> {
    let ty = cur.u8()? as i8;
    Ok(Value::Ext(ty, cur.take(len)?.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode::write_value;

    fn roundtrip(value: Value) {
        let mut buf = Vec::new();
        write_value(&mut buf, &value).unwrap();
        let (decoded, used) = read_value(&buf).unwrap().expect("complete value");
        assert_eq!(used, buf.len());
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_scalar_roundtrips() {
        for n in [0i64, 1, 127, 128, 255, 256, 65535, 65536, i64::MAX, -1, -32, -33, -128, -129, i64::MIN] {
            roundtrip(Value::from(n));
        }
        roundtrip(Value::from(u64::MAX));
        roundtrip(Value::Nil);
        roundtrip(Value::from(true));
        roundtrip(Value::F32(1.5));
        roundtrip(Value::F64(-0.25));
        roundtrip(Value::Binary(vec![0xc1; 300]));
        roundtrip(Value::Ext(0, vec![0x05]));
        roundtrip(Value::Ext(1, vec![0xcd, 0x03, 0xe8]));
    }

    #[test]
    fn test_string_boundary_lengths() {
        for len in [0usize, 31, 32, 255, 256, 65535, 65536] {
            roundtrip(Value::from("x".repeat(len)));
        }
    }

    #[test]
    fn test_nested_map_roundtrip() {
        roundtrip(Value::Map(vec![
            (Value::from("functions"), Value::from(vec!["a", "b"])),
            (Value::from(3), Value::Map(vec![(Value::Nil, Value::from(false))])),
        ]));
    }

    #[test]
    fn test_signed_forms_normalize() {
        // int8 5 and positive fixint 5 are the same value.
        let (value, _) = read_value(&[0xd0, 0x05]).unwrap().unwrap();
        assert_eq!(value, Value::from(5u8));
        let (value, _) = read_value(&[0xd1, 0xff, 0xff]).unwrap().unwrap();
        assert_eq!(value, Value::from(-1));
    }

    #[test]
    fn test_incomplete_returns_none() {
        let mut buf = Vec::new();
        write_value(&mut buf, &Value::from(vec!["hello", "world"])).unwrap();
        for cut in 0..buf.len() {
            assert!(read_value(&buf[..cut]).unwrap().is_none(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_incomplete_reports_needed_length() {
        // str16 header declaring 1000 bytes, 10 present.
        let mut buf = vec![0xda, 0x03, 0xe8];
        buf.extend_from_slice(&[b'x'; 10]);
        assert_eq!(decode_value(&buf).unwrap(), Progress::NeedAtLeast(1003));
        assert_eq!(decode_value(&[]).unwrap(), Progress::NeedAtLeast(1));
        assert_eq!(decode_value(&[0x92, 0x01]).unwrap(), Progress::NeedAtLeast(3));
    }

    #[test]
    fn test_reserved_marker_is_malformed() {
        let err = read_value(&[0xc1]).unwrap_err();
        assert!(matches!(err, RpcError::MalformedMessage { .. }));
        // Also inside a container.
        let err = read_value(&[0x92, 0x01, 0xc1]).unwrap_err();
        assert!(matches!(err, RpcError::MalformedMessage { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let err = read_value(&[0xa2, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, RpcError::MalformedMessage { .. }));
    }

    #[test]
    fn test_depth_limit() {
        let mut buf = vec![0x91; RpcConfig::MAX_VALUE_DEPTH + 2];
        buf.push(0xc0);
        let err = read_value(&buf).unwrap_err();
        assert!(matches!(err, RpcError::MalformedMessage { .. }));
    }

    #[test]
    fn test_huge_declared_length_does_not_preallocate() {
        // array32 claiming u32::MAX elements with one present: just incomplete.
        let buf = [0xdd, 0xff, 0xff, 0xff, 0xff, 0x01];
        assert!(read_value(&buf).unwrap().is_none());
    }

    #[test]
    fn test_read_exact_value_rejects_trailing_bytes() {
        assert_eq!(read_exact_value(&[0x07]).unwrap(), Value::from(7));
        assert!(read_exact_value(&[0x07, 0x08]).is_err());
        assert!(read_exact_value(&[0xcd, 0x01]).is_err());
    }
}
