//! The runtime constant type shared by every layer above the table service:
//! literals in the AST, cells in a row, keys in the MVCC layer, and the
//! values an expression evaluates to.

use std::cmp::Ordering;
use serde_derive::{Deserialize, Serialize};

/// The declared type of a column, distinct from the runtime [`Value`] tag
/// (a `Null` is a `Value`, never a `DataType`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Boolean,
    String,
}

impl DataType {
    /// True if `value` is an acceptable value for a column of this type
    /// (`Null` is always acceptable here; nullability is a separate,
    /// column-level check).
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DataType::Integer, Value::Int(_)) => true,
            (DataType::Float, Value::Float(_)) => true,
            (DataType::Boolean, Value::Bool(_)) => true,
            (DataType::String, Value::String(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Integer => "INT",
            DataType::Float => "FLOAT",
            DataType::Boolean => "BOOL",
            DataType::String => "STRING",
        };
        write!(f, "{}", s)
    }
}

/// A runtime constant: one of five ground types. Ordering is partial (see
/// [`Value::partial_compare`]) and hashing is defined over the byte
/// serialization so that equal values of the same type always hash equally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STRING: u8 = 4;

impl Value {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Int(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::String(_) => Some(DataType::String),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Byte serialization used both for on-disk key construction
    /// (`Row_<table><pk_bytes>`, `Index_<table><col><value_bytes>`) and for
    /// text rendering via [`Value::to_display_string`]. Integers and floats
    /// are encoded so that byte-lexicographic order matches their numeric
    /// order, which is what lets a raw prefix scan over encoded primary
    /// keys come back in ascending order for the common case.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Value::Null => buf.push(TAG_NULL),
            Value::Bool(b) => {
                buf.push(TAG_BOOL);
                buf.push(if *b { 1 } else { 0 });
            }
            Value::Int(i) => {
                buf.push(TAG_INT);
                // Flip the sign bit so negative integers sort before
                // positive ones in big-endian byte order.
                let ordered = (*i as u64) ^ (1u64 << 63);
                buf.extend_from_slice(&ordered.to_be_bytes());
            }
            Value::Float(v) => {
                buf.push(TAG_FLOAT);
                let bits = v.to_bits();
                let ordered = if bits & (1u64 << 63) != 0 { !bits } else { bits | (1u64 << 63) };
                buf.extend_from_slice(&ordered.to_be_bytes());
            }
            Value::String(s) => {
                buf.push(TAG_STRING);
                buf.extend_from_slice(s.as_bytes());
            }
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::error::CResult<Self> {
        use crate::error::Error;
        let (tag, rest) = bytes.split_first().ok_or_else(|| Error::Encoding("empty value bytes".into()))?;
        match *tag {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => Ok(Value::Bool(rest.first().copied().unwrap_or(0) != 0)),
            TAG_INT => {
                if rest.len() != 8 {
                    return Err(Error::Encoding("malformed int value".into()));
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(rest);
                let ordered = u64::from_be_bytes(raw);
                Ok(Value::Int((ordered ^ (1u64 << 63)) as i64))
            }
            TAG_FLOAT => {
                if rest.len() != 8 {
                    return Err(Error::Encoding("malformed float value".into()));
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(rest);
                let ordered = u64::from_be_bytes(raw);
                let bits = if ordered & (1u64 << 63) != 0 { ordered & !(1u64 << 63) } else { !ordered };
                Ok(Value::Float(f64::from_bits(bits)))
            }
            TAG_STRING => Ok(Value::String(String::from_utf8(rest.to_vec())?)),
            other => Err(Error::Encoding(format!("unknown value tag {}", other))),
        }
    }

    /// Partial comparison: `Null == Null`, any non-null value is greater
    /// than `Null`, `Int`/`Float` are cross-comparable by promoting to
    /// `f64`, and any other cross-type pair is incomparable.
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }

    /// A fixed 32-bit mixer over the byte serialization. Equal values of the
    /// same type always hash equally; cross-type collisions are not
    /// guaranteed to be avoided (and are not required to be).
    pub fn hash32(&self) -> u32 {
        // FNV-1a, 32-bit.
        let mut hash: u32 = 0x811c9dc5;
        for byte in self.to_bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x01000193);
        }
        hash
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}
