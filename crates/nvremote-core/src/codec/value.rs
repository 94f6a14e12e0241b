//! MessagePack value model.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

/// A MessagePack integer.
///
/// Normalized on construction: non-negative values are always stored in the
/// unsigned form, so `Integer::from(5i64) == Integer::from(5u64)` and a decoded
/// `int8 0x05` compares equal to a decoded positive fixint `0x05`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Integer(IntRepr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IntRepr {
    Pos(u64),
    /// Always strictly negative.
    Neg(i64),
}

impl Integer {
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            IntRepr::Pos(n) => i64::try_from(n).ok(),
            IntRepr::Neg(n) => Some(n),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.0 {
            IntRepr::Pos(n) => Some(n),
            IntRepr::Neg(_) => None,
        }
    }

    pub(crate) fn is_negative(&self) -> bool {
        matches!(self.0, IntRepr::Neg(_))
    }
}

impl From<u64> for Integer {
    fn from(n: u64) -> Self {
        Integer(IntRepr::Pos(n))
    }
}

impl From<i64> for Integer {
    fn from(n: i64) -> Self {
        if n < 0 {
            Integer(IntRepr::Neg(n))
        } else {
            Integer(IntRepr::Pos(n as u64))
        }
    }
}

macro_rules! integer_from {
    ($via:ty: $($t:ty),*) => {
        $(impl From<$t> for Integer {
            fn from(n: $t) -> Self {
                Integer::from(n as $via)
            }
        })*
    };
}

integer_from!(u64: u8, u16, u32, usize);
integer_from!(i64: i8, i16, i32, isize);

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            IntRepr::Pos(n) => write!(f, "{}", n),
            IntRepr::Neg(n) => write!(f, "{}", n),
        }
    }
}

/// A decoded MessagePack value.
///
/// Covers every type the peer can put on the wire. Floats, binary and ext
/// values appear in real Neovim traffic (ext types 0/1/2 are buffer, window
/// and tabpage handles).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(Integer),
    F32(f32),
    F64(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Ext(i8, Vec<u8>),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a string key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

impl From<Integer> for Value {
    fn from(n: Integer) -> Self {
        Value::Integer(n)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Integer(Integer::from(n))
            }
        })*
    };
}

value_from_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::F64(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

/// Strings print raw; everything else prints as JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => {
                let json = serde_json::to_string(other).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => match n.as_i64() {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_u64(n.as_u64().unwrap_or_default()),
            },
            Value::F32(n) => serializer.serialize_f32(*n),
            Value::F64(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Binary(bytes) => serializer.serialize_bytes(bytes),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    // JSON object keys must be strings.
                    map.serialize_entry(&k.to_string(), v)?;
                }
                map.end()
            }
            Value::Ext(ty, data) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(ty)?;
                seq.serialize_element(data)?;
                seq.end()
            }
        }
    }
}
