//! Field types and values.
//!
//! Every field has a fixed on-disk width so that tuples, and therefore
//! page slots, have a fixed byte size.

use std::fmt;

use crate::error::{DbError, DbResult};

/// Data types supported by the storage core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer, stored as 4 bytes big-endian.
    Int,
    /// String with a fixed byte capacity, stored as a 4-byte big-endian
    /// length prefix followed by the capacity's worth of bytes
    /// (zero-padded past the actual length).
    Str(usize),
}

impl DataType {
    /// On-disk width of a field of this type.
    pub fn byte_len(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Str(cap) => 4 + cap,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Str(cap) => write!(f, "str({})", cap),
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int(i32),
    Str(String),
}

impl Value {
    /// Checks whether this value can be stored in a field of the given type.
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        match (self, data_type) {
            (Value::Int(_), DataType::Int) => true,
            (Value::Str(s), DataType::Str(cap)) => s.len() <= cap,
            _ => false,
        }
    }

    /// Encodes this value into `buf`, which must be exactly
    /// `data_type.byte_len()` bytes.
    pub fn encode_into(&self, data_type: DataType, buf: &mut [u8]) -> DbResult<()> {
        debug_assert_eq!(buf.len(), data_type.byte_len());
        match (self, data_type) {
            (Value::Int(i), DataType::Int) => {
                buf.copy_from_slice(&i.to_be_bytes());
                Ok(())
            }
            (Value::Str(s), DataType::Str(cap)) if s.len() <= cap => {
                buf[..4].copy_from_slice(&(s.len() as u32).to_be_bytes());
                buf[4..4 + s.len()].copy_from_slice(s.as_bytes());
                buf[4 + s.len()..].fill(0);
                Ok(())
            }
            _ => Err(DbError::SchemaMismatch),
        }
    }

    /// Decodes a value of the given type from `buf`, which must be exactly
    /// `data_type.byte_len()` bytes.
    pub fn decode(data_type: DataType, buf: &[u8]) -> DbResult<Value> {
        debug_assert_eq!(buf.len(), data_type.byte_len());
        match data_type {
            DataType::Int => {
                let raw: [u8; 4] = buf.try_into().map_err(|_| DbError::SchemaMismatch)?;
                Ok(Value::Int(i32::from_be_bytes(raw)))
            }
            DataType::Str(cap) => {
                let len = u32::from_be_bytes(buf[..4].try_into().unwrap()) as usize;
                if len > cap {
                    return Err(DbError::SchemaMismatch);
                }
                let s = std::str::from_utf8(&buf[4..4 + len])
                    .map_err(|_| DbError::SchemaMismatch)?
                    .to_string();
                Ok(Value::Str(s))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_len() {
        assert_eq!(DataType::Int.byte_len(), 4);
        assert_eq!(DataType::Str(16).byte_len(), 20);
    }

    #[test]
    fn test_int_round_trip() {
        let mut buf = [0u8; 4];
        for i in [0, 1, -1, i32::MIN, i32::MAX] {
            Value::Int(i).encode_into(DataType::Int, &mut buf).unwrap();
            assert_eq!(Value::decode(DataType::Int, &buf).unwrap(), Value::Int(i));
        }
    }

    #[test]
    fn test_int_is_big_endian() {
        let mut buf = [0u8; 4];
        Value::Int(1).encode_into(DataType::Int, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 1]);
    }

    #[test]
    fn test_str_round_trip() {
        let dt = DataType::Str(8);
        let mut buf = vec![0u8; dt.byte_len()];
        Value::Str("hi".into()).encode_into(dt, &mut buf).unwrap();
        assert_eq!(&buf[..4], &2u32.to_be_bytes());
        assert_eq!(Value::decode(dt, &buf).unwrap(), Value::Str("hi".into()));
    }

    #[test]
    fn test_str_over_capacity() {
        let dt = DataType::Str(2);
        let mut buf = vec![0u8; dt.byte_len()];
        let result = Value::Str("too long".into()).encode_into(dt, &mut buf);
        assert!(matches!(result, Err(DbError::SchemaMismatch)));
    }

    #[test]
    fn test_compatibility() {
        assert!(Value::Int(7).is_compatible_with(DataType::Int));
        assert!(!Value::Int(7).is_compatible_with(DataType::Str(8)));
        assert!(Value::Str("ok".into()).is_compatible_with(DataType::Str(2)));
        assert!(!Value::Str("nope".into()).is_compatible_with(DataType::Str(2)));
    }
}
