//! Single-node Redis client state machine
//!
//! `redis-leaf` multiplexes commands from many callers onto one TCP
//! connection, keeps that connection alive across failures, and preserves
//! at-most-once submission with bounded backpressure. It is the per-node
//! leaf a cluster client builds on: one instance per `(host, port)`
//! endpoint, with routing, slot maps, and redirect handling left to the
//! enclosing layer.
//!
//! # How it works
//!
//! Accepted commands wait in a bounded queue and move into a bounded
//! in-flight window as the pipeline drains them onto the wire; replies are
//! matched FIFO. On disconnect, in-flight commands are replayed ahead of
//! the queue in their original order. A reconnect supervisor re-dials the
//! endpoint forever, re-running the `CLUSTER MYID` / `HELLO 3` handshake
//! on every fresh socket; once the endpoint has been unreachable past a
//! configurable timeout, queued and future commands fail fast with
//! `NodeDown` until the connection returns. Lifecycle transitions are
//! reported, deduplicated, to an optional observer channel.
//!
//! # Quick start
//!
//! ```no_run
//! use redis_leaf::{Client, ClientConfig, Payload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::start("localhost", 6379, ClientConfig::new())?;
//!
//!     let pong = client.command(Payload::command(["PING"])).await?;
//!     println!("{pong:?}");
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]

pub mod client;
pub mod connection;
pub mod core;
pub mod protocol;
pub mod status;

mod handshake;
mod queue;
mod supervisor;

pub use crate::client::{Client, ReplySink};
pub use crate::connection::{ConnectionEvent, ConnectionHandle, TcpTransport, Transport};
pub use crate::core::{
    config::{ClientConfig, ProtocolVersion},
    error::{RedisError, RedisResult},
    value::RespValue,
};
pub use crate::protocol::Payload;
pub use crate::status::{ConnectionStatus, DownReason, StatusEvent};
