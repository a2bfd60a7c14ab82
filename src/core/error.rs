//! Error types for client operations

use thiserror::Error;

/// Result type for client operations
pub type RedisResult<T> = Result<T, RedisError>;

/// Error type surfaced to callers and collaborators
///
/// Payloads are strings so the enum stays `Clone + PartialEq`; status
/// deduplication compares down reasons structurally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedisError {
    /// The waiting queue exceeded its bound and this command was dropped
    /// from the head
    #[error("waiting queue overflow, command dropped")]
    QueueOverflow,

    /// The node has been unreachable for longer than `node_down_timeout`
    #[error("node is down")]
    NodeDown,

    /// The client was stopped while this command was still queued
    #[error("client stopped: {0}")]
    Stopped(String),

    /// A caller-side deadline expired before the reply arrived
    #[error("operation timed out")]
    Timeout,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Protocol parsing error
    #[error("protocol error: {0}")]
    Protocol(String),
}
