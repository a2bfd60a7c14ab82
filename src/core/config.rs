//! Configuration types for the client

use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::error::{RedisError, RedisResult};
use crate::status::StatusEvent;

/// Protocol version negotiated during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// RESP2, no `HELLO` sent
    Resp2,
    /// RESP3, `HELLO 3` sent on every fresh connection - Default
    #[default]
    Resp3,
}

/// Configuration for a single-node client
///
/// Queue bounds and timers drive the state machine; the transport options
/// are forwarded to the connection layer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout for each connect attempt
    pub connect_timeout: Duration,

    /// Enable TCP keepalive with the given interval
    pub tcp_keepalive: Option<Duration>,

    /// Hard bound on the waiting queue; overflow drops from the head
    pub max_waiting: usize,

    /// In-flight window toward the server
    pub max_pending: usize,

    /// Waiting level below which `queue_ok` is emitted after `queue_full`;
    /// must be strictly less than `max_waiting`
    pub queue_ok_level: usize,

    /// Delay between connect attempts and between handshake retries
    pub reconnect_wait: Duration,

    /// Continuous no-connection time before the node is declared down
    pub node_down_timeout: Duration,

    /// Preferred protocol version
    pub resp_version: ProtocolVersion,

    /// Fetch `CLUSTER MYID` during the handshake
    pub use_cluster_id: bool,

    /// Observer for connection status events, if any
    pub status_channel: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            tcp_keepalive: Some(Duration::from_secs(60)),
            max_waiting: 5000,
            max_pending: 128,
            queue_ok_level: 2000,
            reconnect_wait: Duration::from_millis(1000),
            node_down_timeout: Duration::from_millis(3000),
            resp_version: ProtocolVersion::default(),
            use_cluster_id: false,
            status_channel: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the TCP keepalive interval, or disable keepalive with `None`
    #[must_use]
    pub const fn with_tcp_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.tcp_keepalive = keepalive;
        self
    }

    /// Set the waiting queue bound
    #[must_use]
    pub const fn with_max_waiting(mut self, max: usize) -> Self {
        self.max_waiting = max;
        self
    }

    /// Set the in-flight window
    #[must_use]
    pub const fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max;
        self
    }

    /// Set the `queue_ok` hysteresis level
    #[must_use]
    pub const fn with_queue_ok_level(mut self, level: usize) -> Self {
        self.queue_ok_level = level;
        self
    }

    /// Set the reconnect delay
    #[must_use]
    pub const fn with_reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }

    /// Set the node-down timeout
    #[must_use]
    pub const fn with_node_down_timeout(mut self, timeout: Duration) -> Self {
        self.node_down_timeout = timeout;
        self
    }

    /// Set the preferred protocol version
    #[must_use]
    pub const fn with_resp_version(mut self, version: ProtocolVersion) -> Self {
        self.resp_version = version;
        self
    }

    /// Fetch `CLUSTER MYID` during the handshake
    #[must_use]
    pub const fn with_cluster_id(mut self, use_cluster_id: bool) -> Self {
        self.use_cluster_id = use_cluster_id;
        self
    }

    /// Deliver status events to the given channel
    #[must_use]
    pub fn with_status_channel(mut self, tx: mpsc::UnboundedSender<StatusEvent>) -> Self {
        self.status_channel = Some(tx);
        self
    }

    /// Check configuration consistency
    ///
    /// # Errors
    ///
    /// Returns `RedisError::Config` if `queue_ok_level` is not strictly
    /// below `max_waiting` or the in-flight window is zero.
    pub fn validate(&self) -> RedisResult<()> {
        if self.queue_ok_level >= self.max_waiting {
            return Err(RedisError::Config(format!(
                "queue_ok_level ({}) must be less than max_waiting ({})",
                self.queue_ok_level, self.max_waiting
            )));
        }
        if self.max_pending == 0 {
            return Err(RedisError::Config(
                "max_pending must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn queue_ok_level_must_be_below_max_waiting() {
        let config = ClientConfig::new()
            .with_max_waiting(100)
            .with_queue_ok_level(100);
        assert!(matches!(config.validate(), Err(RedisError::Config(_))));
    }

    #[test]
    fn zero_window_rejected() {
        let config = ClientConfig::new().with_max_pending(0);
        assert!(matches!(config.validate(), Err(RedisError::Config(_))));
    }

    #[test]
    fn builder_chains() {
        let config = ClientConfig::new()
            .with_max_pending(2)
            .with_resp_version(ProtocolVersion::Resp2)
            .with_cluster_id(true);
        assert_eq!(config.max_pending, 2);
        assert_eq!(config.resp_version, ProtocolVersion::Resp2);
        assert!(config.use_cluster_id);
    }
}
