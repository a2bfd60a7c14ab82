//! RESP (`REdis` Serialization Protocol) value types
//!
//! A single enum covers RESP2 and the RESP3 types a `HELLO 3` session
//! produces. Maps keep insertion order as key/value pairs; Redis map keys
//! are not guaranteed to be strings, and ordered pairs keep the type
//! `PartialEq` without hashing.

use crate::core::error::{RedisError, RedisResult};
use bytes::Bytes;

/// A decoded RESP protocol value
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: `+OK\r\n`
    SimpleString(String),
    /// Error: `-ERR message\r\n`
    Error(String),
    /// Integer: `:1000\r\n`
    Integer(i64),
    /// Bulk string: `$6\r\nfoobar\r\n`
    BulkString(Bytes),
    /// Null: `$-1\r\n`, `*-1\r\n` (RESP2) or `_\r\n` (RESP3)
    Null,
    /// Array: `*2\r\n...`
    Array(Vec<RespValue>),
    /// RESP3 map: `%2\r\n...`, key/value pairs in wire order
    Map(Vec<(RespValue, RespValue)>),
    /// RESP3 set: `~3\r\n...`
    Set(Vec<RespValue>),
    /// RESP3 push frame: `>4\r\n...`, server-initiated
    Push(Vec<RespValue>),
    /// RESP3 boolean: `#t\r\n` / `#f\r\n`
    Boolean(bool),
    /// RESP3 double: `,1.23\r\n`
    Double(f64),
}

impl RespValue {
    /// True if this value is a protocol-level error reply
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Convert to a string if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to a string.
    pub fn as_string(&self) -> RedisResult<String> {
        match self {
            Self::SimpleString(s) => Ok(s.clone()),
            Self::BulkString(b) => String::from_utf8(b.to_vec())
                .map_err(|e| RedisError::Protocol(format!("invalid UTF-8: {e}"))),
            Self::Null => Err(RedisError::Protocol("value is null".to_string())),
            _ => Err(RedisError::Protocol(format!(
                "cannot convert {self:?} to string"
            ))),
        }
    }

    /// Convert to raw bytes if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value carries no byte payload.
    pub fn as_bytes(&self) -> RedisResult<Bytes> {
        match self {
            Self::BulkString(b) => Ok(b.clone()),
            Self::SimpleString(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            Self::Null => Err(RedisError::Protocol("value is null".to_string())),
            _ => Err(RedisError::Protocol(format!(
                "cannot convert {self:?} to bytes"
            ))),
        }
    }

    /// Convert to an integer if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to an integer.
    pub fn as_int(&self) -> RedisResult<i64> {
        match self {
            Self::Integer(i) => Ok(*i),
            Self::BulkString(b) => {
                let s = String::from_utf8(b.to_vec())
                    .map_err(|e| RedisError::Protocol(format!("invalid UTF-8: {e}")))?;
                s.parse::<i64>()
                    .map_err(|e| RedisError::Protocol(format!("cannot parse integer: {e}")))
            }
            _ => Err(RedisError::Protocol(format!(
                "cannot convert {self:?} to integer"
            ))),
        }
    }

    /// Convert to an array of values if possible
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an aggregate.
    pub fn as_array(&self) -> RedisResult<Vec<RespValue>> {
        match self {
            Self::Array(items) | Self::Set(items) | Self::Push(items) => Ok(items.clone()),
            _ => Err(RedisError::Protocol(format!(
                "cannot convert {self:?} to array"
            ))),
        }
    }
}

impl From<&str> for RespValue {
    fn from(s: &str) -> Self {
        Self::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i64> for RespValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_conversions() {
        assert_eq!(
            RespValue::SimpleString("OK".to_string()).as_string().unwrap(),
            "OK"
        );
        assert_eq!(
            RespValue::BulkString(Bytes::from("abc")).as_string().unwrap(),
            "abc"
        );
        assert!(RespValue::Null.as_string().is_err());
    }

    #[test]
    fn bytes_from_simple_string() {
        let id = RespValue::SimpleString("deadbeef".to_string());
        assert_eq!(id.as_bytes().unwrap(), Bytes::from("deadbeef"));
    }

    #[test]
    fn error_detection() {
        assert!(RespValue::Error("ERR nope".to_string()).is_error());
        assert!(!RespValue::Integer(1).is_error());
    }

    #[test]
    fn int_from_bulk() {
        assert_eq!(RespValue::BulkString(Bytes::from("42")).as_int().unwrap(), 42);
        assert!(RespValue::Boolean(true).as_int().is_err());
    }
}
