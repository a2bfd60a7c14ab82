//! RESP wire codec
//!
//! Commands are encoded up front into [`Payload`] values that carry their
//! expected reply count, so a pipelined batch maps to exactly one reply on
//! the way back. The decoder works incrementally over a cursor and returns
//! `Ok(None)` when the buffer does not yet hold a complete frame.

use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::error::{RedisError, RedisResult};
use crate::core::value::RespValue;

const CRLF: &[u8] = b"\r\n";

/// An already-serialized command or pipeline, opaque to the state machine.
///
/// Cheap to clone; the byte buffer is shared. The reply count tells the
/// transport how many top-level frames to collect before delivering the
/// single reply event for this payload.
#[derive(Debug, Clone)]
pub struct Payload {
    bytes: Bytes,
    replies: usize,
}

impl Payload {
    /// Encode a single command from its arguments.
    ///
    /// ```
    /// use redis_leaf::Payload;
    ///
    /// let p = Payload::command(["SET", "key", "value"]);
    /// assert_eq!(p.replies(), 1);
    /// ```
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let args: Vec<_> = args.into_iter().collect();
        let mut buf = BytesMut::new();
        buf.put_u8(b'*');
        buf.put_slice(args.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        for arg in &args {
            let arg = arg.as_ref();
            buf.put_u8(b'$');
            buf.put_slice(arg.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(arg);
            buf.put_slice(CRLF);
        }
        Self {
            bytes: buf.freeze(),
            replies: 1,
        }
    }

    /// Concatenate payloads into one pipelined batch.
    ///
    /// The batch is written as a single submission and answered by a single
    /// reply event carrying the individual replies in order.
    pub fn pipeline<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Payload>,
    {
        let mut buf = BytesMut::new();
        let mut replies = 0;
        for part in parts {
            buf.put_slice(&part.bytes);
            replies += part.replies;
        }
        Self {
            bytes: buf.freeze(),
            replies,
        }
    }

    /// The serialized wire bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// How many top-level RESP frames answer this payload.
    pub fn replies(&self) -> usize {
        self.replies
    }
}

/// Incremental RESP2/RESP3 frame decoder.
pub struct RespDecoder;

impl RespDecoder {
    /// Decode one value from the cursor.
    ///
    /// Returns `Ok(None)` if the buffer does not yet contain a complete
    /// frame; the cursor position is only meaningful on `Ok(Some(_))`.
    ///
    /// # Errors
    ///
    /// Returns `RedisError::Protocol` on malformed frames.
    pub fn decode(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        if !buf.has_remaining() {
            return Ok(None);
        }

        let type_byte = buf.chunk()[0];
        buf.advance(1);

        match type_byte {
            b'+' => Ok(Self::read_line(buf)?.map(RespValue::SimpleString)),
            b'-' => Ok(Self::read_line(buf)?.map(RespValue::Error)),
            b':' => match Self::read_line(buf)? {
                Some(line) => Ok(Some(RespValue::Integer(Self::parse_int(&line)?))),
                None => Ok(None),
            },
            b'$' => Self::decode_bulk(buf),
            b'*' => Self::decode_aggregate(buf, 1, RespValue::Array),
            b'~' => Self::decode_aggregate(buf, 1, RespValue::Set),
            b'>' => Self::decode_aggregate(buf, 1, RespValue::Push),
            b'%' => Self::decode_map(buf),
            b'#' => match Self::read_line(buf)? {
                Some(line) => match line.as_str() {
                    "t" => Ok(Some(RespValue::Boolean(true))),
                    "f" => Ok(Some(RespValue::Boolean(false))),
                    other => Err(RedisError::Protocol(format!("invalid boolean: {other}"))),
                },
                None => Ok(None),
            },
            b',' => match Self::read_line(buf)? {
                Some(line) => {
                    let value = line.parse::<f64>().map_err(|e| {
                        RedisError::Protocol(format!("invalid double: {e}"))
                    })?;
                    Ok(Some(RespValue::Double(value)))
                }
                None => Ok(None),
            },
            b'_' => match Self::read_line(buf)? {
                Some(_) => Ok(Some(RespValue::Null)),
                None => Ok(None),
            },
            other => Err(RedisError::Protocol(format!(
                "invalid RESP type byte: {}",
                other as char
            ))),
        }
    }

    fn decode_bulk(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        let len = match Self::read_line(buf)? {
            Some(line) => Self::parse_int(&line)?,
            None => return Ok(None),
        };

        if len == -1 {
            return Ok(Some(RespValue::Null));
        }
        let len = usize::try_from(len)
            .map_err(|_| RedisError::Protocol(format!("invalid bulk length: {len}")))?;

        if buf.remaining() < len + 2 {
            return Ok(None);
        }
        let data = Bytes::copy_from_slice(&buf.chunk()[..len]);
        buf.advance(len + 2);
        Ok(Some(RespValue::BulkString(data)))
    }

    fn decode_aggregate(
        buf: &mut Cursor<&[u8]>,
        per_entry: usize,
        build: fn(Vec<RespValue>) -> RespValue,
    ) -> RedisResult<Option<RespValue>> {
        let len = match Self::read_line(buf)? {
            Some(line) => Self::parse_int(&line)?,
            None => return Ok(None),
        };

        if len == -1 {
            return Ok(Some(RespValue::Null));
        }
        let len = usize::try_from(len)
            .map_err(|_| RedisError::Protocol(format!("invalid aggregate length: {len}")))?;

        let mut items = Vec::with_capacity(len * per_entry);
        for _ in 0..len * per_entry {
            match Self::decode(buf)? {
                Some(value) => items.push(value),
                None => return Ok(None),
            }
        }
        Ok(Some(build(items)))
    }

    fn decode_map(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<RespValue>> {
        match Self::decode_aggregate(buf, 2, RespValue::Array)? {
            Some(RespValue::Array(flat)) => {
                let mut pairs = Vec::with_capacity(flat.len() / 2);
                let mut iter = flat.into_iter();
                while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                    pairs.push((k, v));
                }
                Ok(Some(RespValue::Map(pairs)))
            }
            Some(RespValue::Null) => Ok(Some(RespValue::Null)),
            Some(_) => unreachable!("aggregate decoder yields arrays"),
            None => Ok(None),
        }
    }

    fn parse_int(line: &str) -> RedisResult<i64> {
        line.parse::<i64>()
            .map_err(|e| RedisError::Protocol(format!("invalid integer: {e}")))
    }

    fn read_line(buf: &mut Cursor<&[u8]>) -> RedisResult<Option<String>> {
        let start = buf.position() as usize;
        let slice = buf.get_ref();

        for i in start..slice.len().saturating_sub(1) {
            if slice[i] == b'\r' && slice[i + 1] == b'\n' {
                let line = String::from_utf8(slice[start..i].to_vec())
                    .map_err(|e| RedisError::Protocol(format!("invalid UTF-8: {e}")))?;
                buf.set_position((i + 2) as u64);
                return Ok(Some(line));
            }
        }
        Ok(None)
    }
}
