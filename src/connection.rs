//! Transport contract and the default TCP implementation
//!
//! The state machine consumes connections only through [`Transport`] and
//! [`ConnectionHandle`]: submission is fire-and-forget, and every submitted
//! payload is answered by exactly one [`ConnectionEvent::Reply`], in
//! submission order. [`ConnectionEvent::Closed`] arrives at most once; the
//! handle accepts no further submissions afterwards.

use std::collections::VecDeque;
use std::io::Cursor;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::config::ClientConfig;
use crate::core::error::{RedisError, RedisResult};
use crate::core::value::RespValue;
use crate::protocol::{Payload, RespDecoder};

/// Events a live connection delivers to its owner.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// One reply per submitted payload, in submission order. A payload
    /// expecting more than one frame gets them grouped into a single
    /// `RespValue::Array`.
    Reply(RespValue),
    /// The socket is gone; emitted at most once, after which no further
    /// events follow.
    Closed(String),
}

/// A writable handle to an established connection.
pub trait ConnectionHandle: Send + Sync {
    /// Hand a payload to the transport. Never blocks; delivery failures
    /// surface as a `Closed` event, not here.
    fn submit(&self, payload: Payload);
}

/// Async connection factory consumed by the reconnect supervisor.
///
/// Implementations deliver replies and the closed signal through the
/// `events` channel handed to `connect`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish a connection to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns `RedisError::Connection` when the endpoint cannot be
    /// reached within the configured timeout.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        config: &ClientConfig,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> RedisResult<Box<dyn ConnectionHandle>>;
}

/// Default transport: one TCP socket per connection, driven by a single
/// I/O task.
#[derive(Debug, Default)]
pub struct TcpTransport;

struct TcpHandle {
    submit_tx: mpsc::UnboundedSender<Payload>,
}

impl ConnectionHandle for TcpHandle {
    fn submit(&self, payload: Payload) {
        // A failed send means the I/O task already emitted Closed.
        let _ = self.submit_tx.send(payload);
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        config: &ClientConfig,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> RedisResult<Box<dyn ConnectionHandle>> {
        let addr = format!("{}:{}", host, port);
        debug!("connecting to {}", addr);

        let stream = timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| RedisError::Connection(format!("connect to {} timed out", addr)))?
            .map_err(|e| RedisError::Connection(format!("connect to {} failed: {}", addr, e)))?;

        let stream = match config.tcp_keepalive {
            Some(interval) => {
                let socket = socket2::Socket::from(stream.into_std().map_err(io_err)?);
                let keepalive = socket2::TcpKeepalive::new().with_time(interval);
                socket
                    .set_tcp_keepalive(&keepalive)
                    .map_err(|e| RedisError::Connection(format!("keepalive setup failed: {e}")))?;
                TcpStream::from_std(socket.into()).map_err(io_err)?
            }
            None => stream,
        };

        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_io(stream, submit_rx, events));
        Ok(Box::new(TcpHandle { submit_tx }))
    }
}

fn io_err(e: std::io::Error) -> RedisError {
    RedisError::Connection(e.to_string())
}

/// Owns the socket for its whole life: writes submitted payloads, decodes
/// reply frames, groups them per payload, and terminates with one `Closed`.
async fn run_io(
    stream: TcpStream,
    mut submit_rx: mpsc::UnboundedReceiver<Payload>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut read_buffer = BytesMut::with_capacity(8192);
    let mut grouper = ReplyGrouper::new();

    let reason = loop {
        tokio::select! {
            submission = submit_rx.recv() => match submission {
                Some(payload) => {
                    // degenerate empty pipeline: answer it without touching the wire
                    if payload.replies() == 0 {
                        let _ = events.send(ConnectionEvent::Reply(RespValue::Array(Vec::new())));
                        continue;
                    }
                    grouper.expect(payload.replies());
                    if let Err(e) = writer.write_all(payload.bytes()).await {
                        break format!("write failed: {e}");
                    }
                }
                // Every handle clone dropped: the owner is done with us.
                None => break "connection handle dropped".to_string(),
            },
            read = reader.read_buf(&mut read_buffer) => match read {
                Ok(0) => break "connection closed by server".to_string(),
                Ok(_) => {
                    if let Err(reason) = grouper.drain(&mut read_buffer, &events) {
                        break reason;
                    }
                }
                Err(e) => break format!("read failed: {e}"),
            },
        }
    };

    debug!("connection task exiting: {}", reason);
    let _ = events.send(ConnectionEvent::Closed(reason));
}

/// Collects decoded frames into per-payload replies.
struct ReplyGrouper {
    expected: VecDeque<usize>,
    batch: Vec<RespValue>,
}

impl ReplyGrouper {
    fn new() -> Self {
        Self {
            expected: VecDeque::new(),
            batch: Vec::new(),
        }
    }

    fn expect(&mut self, replies: usize) {
        self.expected.push_back(replies);
    }

    /// Decode every complete frame in the buffer, emitting one `Reply`
    /// event per fully-answered payload. Push frames are out-of-band and
    /// never consume a reply slot.
    fn drain(
        &mut self,
        buffer: &mut BytesMut,
        events: &mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<(), String> {
        loop {
            let mut cursor = Cursor::new(&buffer[..]);
            let value = match RespDecoder::decode(&mut cursor) {
                Ok(Some(value)) => {
                    let consumed = cursor.position() as usize;
                    buffer.advance(consumed);
                    value
                }
                Ok(None) => return Ok(()),
                Err(e) => return Err(format!("protocol error: {e}")),
            };

            if let RespValue::Push(frame) = value {
                debug!("discarding out-of-band push frame: {:?}", frame);
                continue;
            }

            let Some(&want) = self.expected.front() else {
                warn!("reply without a pending request: {:?}", value);
                return Err("reply without a pending request".to_string());
            };

            if want == 1 && self.batch.is_empty() {
                self.expected.pop_front();
                let _ = events.send(ConnectionEvent::Reply(value));
            } else {
                self.batch.push(value);
                if self.batch.len() == want {
                    self.expected.pop_front();
                    let replies = std::mem::take(&mut self.batch);
                    let _ = events.send(ConnectionEvent::Reply(RespValue::Array(replies)));
                }
            }
        }
    }
}
