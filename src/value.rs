use std::borrow::Cow;
#[cfg(feature = "serde")]
use std::fmt;

#[cfg(feature = "serde")]
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
    ser::SerializeMap,
};

use crate::encode::{Dispatcher, Encode};
use crate::node::{Entry, Ext, Node};

/// Dynamic MessagePack value
///
/// This type can represent any MessagePack value without knowing its type at compile
/// time. [`Decoder`](crate::Decoder) produces it, and it encodes like the value it
/// holds. Positive fixints decode as [`Value::UInteger`], the int8..int64 family
/// and negative fixints as [`Value::Integer`].
///
/// # Example
/// ```
/// use msgpack_record::{Decoder, Value, to_vec};
///
/// let value = Value::Map(vec![
///     (Value::Str("name".to_string()), Value::Str("Alice".to_string())),
///     (Value::Str("age".to_string()), Value::UInteger(30)),
/// ]);
///
/// let bytes = to_vec(&value).unwrap();
/// let decoded = Decoder::new(&bytes[..]).next_value().unwrap();
/// assert_eq!(decoded, Some(value));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Signed integer (int8..int64, negative fixint)
    Integer(i64),
    /// Unsigned integer (uint8..uint64, positive fixint)
    UInteger(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<Value>),
    /// Map entries in wire order
    Map(Vec<(Value, Value)>),
    /// Extension value (type code as the raw byte, so timestamps are `0xff`)
    Ext(u8, Vec<u8>),
}

impl Encode for Value {
    fn encode<'a>(&'a self, enc: &mut Dispatcher<'_>) -> Node<'a> {
        match self {
            Value::Nil => Node::Nil,
            Value::Bool(b) => Node::Bool(*b),
            Value::Integer(i) => Node::Int(*i),
            Value::UInteger(u) => Node::Uint(*u),
            Value::F32(f) => Node::F32(*f),
            Value::F64(f) => Node::F64(*f),
            Value::Str(s) => Node::str(s),
            Value::Bin(b) => Node::bin(b),
            Value::Array(items) => Node::Array(items.iter().map(|v| enc.dispatch(v)).collect()),
            Value::Map(entries) => Node::Map(
                entries
                    .iter()
                    .map(|(k, v)| Entry::new(enc.dispatch(k), enc.dispatch(v)))
                    .collect(),
            ),
            Value::Ext(code, data) => Node::Ext(Ext {
                code: *code,
                data: Cow::Borrowed(data),
            }),
        }
    }

    fn is_empty_value(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Bool(b) => !b,
            Value::Integer(i) => *i == 0,
            Value::UInteger(u) => *u == 0,
            Value::F32(f) => *f == 0.0,
            Value::F64(f) => *f == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::Bin(b) => b.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Ext(..) => false,
        }
    }
}

#[cfg(feature = "serde")]
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Nil => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::UInteger(u) => serializer.serialize_u64(*u),
            Value::F32(f) => serializer.serialize_f32(*f),
            Value::F64(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bin(b) => serializer.serialize_bytes(b),
            Value::Array(a) => a.serialize(serializer),
            Value::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            // serde has no extension concept; keep the code next to the payload
            Value::Ext(code, data) => (code, serde_bytes::Bytes::new(data)).serialize(serializer),
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("any valid MessagePack value")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Value, E> {
                Ok(Value::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Value, E> {
                Ok(Value::Integer(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Value, E> {
                Ok(Value::UInteger(value))
            }

            fn visit_f32<E>(self, value: f32) -> Result<Value, E> {
                Ok(Value::F32(value))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Value, E> {
                Ok(Value::F64(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::Str(value.to_owned()))
            }

            fn visit_string<E>(self, value: String) -> Result<Value, E> {
                Ok(Value::Str(value))
            }

            fn visit_bytes<E>(self, value: &[u8]) -> Result<Value, E>
            where
                E: de::Error,
            {
                Ok(Value::Bin(value.to_vec()))
            }

            fn visit_byte_buf<E>(self, value: Vec<u8>) -> Result<Value, E> {
                Ok(Value::Bin(value))
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Nil)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Nil)
            }

            fn visit_seq<V>(self, mut visitor: V) -> Result<Value, V::Error>
            where
                V: de::SeqAccess<'de>,
            {
                let mut vec = Vec::new();
                while let Some(elem) = visitor.next_element()? {
                    vec.push(elem);
                }
                Ok(Value::Array(vec))
            }

            fn visit_map<V>(self, mut visitor: V) -> Result<Value, V::Error>
            where
                V: de::MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(entry) = visitor.next_entry()? {
                    entries.push(entry);
                }
                Ok(Value::Map(entries))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Returns true for both signed and unsigned integers
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::UInteger(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::F32(_) | Value::F64(_))
    }

    pub fn is_bin(&self) -> bool {
        matches!(self, Value::Bin(_))
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn is_ext(&self) -> bool {
        matches!(self, Value::Ext(..))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an `i64` if it is an integer that fits
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::UInteger(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Returns the value as a `u64` if it is a non-negative integer
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInteger(u) => Some(*u),
            Value::Integer(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(f) => Some(*f as f64),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bin(&self) -> Option<&[u8]> {
        match self {
            Value::Bin(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the extension code and payload
    pub fn as_ext(&self) -> Option<(u8, &[u8])> {
        match self {
            Value::Ext(code, data) => Some((*code, data)),
            _ => None,
        }
    }

    /// Looks up a map entry by string key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}
