//! Connection status reporting
//!
//! Lifecycle events are deduplicated against the last emitted value and
//! delivered fire-and-forget to an optional observer channel.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

/// Why the connection went down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownReason {
    /// A connect attempt failed
    ConnectError(String),
    /// The handshake batch returned errors
    InitError(Vec<String>),
    /// The socket closed after being established
    SocketClosed(String),
    /// The client was stopped
    ClientStopped(String),
}

/// Connection lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connection is established and the handshake completed
    Up,
    /// No usable connection
    Down(DownReason),
    /// The waiting queue crossed its bound; commands are being dropped
    QueueFull,
    /// The waiting queue drained below the ok level again
    QueueOk,
}

/// A status notification delivered to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// Endpoint host
    pub host: String,
    /// Endpoint port
    pub port: u16,
    /// Cluster id observed during the most recent handshake, if any
    pub cluster_id: Option<Bytes>,
    /// The status value
    pub status: ConnectionStatus,
}

/// Deduplicating dispatcher for [`StatusEvent`]s.
#[derive(Debug)]
pub(crate) struct StatusReporter {
    host: String,
    port: u16,
    cluster_id: Option<Bytes>,
    last: Option<ConnectionStatus>,
    observer: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl StatusReporter {
    pub(crate) fn new(
        host: String,
        port: u16,
        observer: Option<mpsc::UnboundedSender<StatusEvent>>,
    ) -> Self {
        Self {
            host,
            port,
            cluster_id: None,
            last: None,
            observer,
        }
    }

    pub(crate) fn set_cluster_id(&mut self, cluster_id: Option<Bytes>) {
        self.cluster_id = cluster_id;
    }

    /// Emit a status unless it equals the previous one. Delivery is
    /// best-effort; a gone observer is ignored.
    pub(crate) fn emit(&mut self, status: ConnectionStatus) {
        if self.last.as_ref() == Some(&status) {
            return;
        }
        debug!("connection status: {:?}", status);
        self.last = Some(status.clone());
        if let Some(observer) = &self.observer {
            let _ = observer.send(StatusEvent {
                host: self.host.clone(),
                port: self.port,
                cluster_id: self.cluster_id.clone(),
                status,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> (StatusReporter, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StatusReporter::new("localhost".to_string(), 6379, Some(tx)), rx)
    }

    #[test]
    fn consecutive_duplicates_are_suppressed() {
        let (mut reporter, mut rx) = reporter();
        let reason = DownReason::ConnectError("refused".to_string());
        reporter.emit(ConnectionStatus::Down(reason.clone()));
        reporter.emit(ConnectionStatus::Down(reason));
        assert_eq!(rx.try_recv().unwrap().status, ConnectionStatus::Down(
            DownReason::ConnectError("refused".to_string())
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn different_reasons_pass_through() {
        let (mut reporter, mut rx) = reporter();
        reporter.emit(ConnectionStatus::Down(DownReason::ConnectError(
            "refused".to_string(),
        )));
        reporter.emit(ConnectionStatus::Down(DownReason::SocketClosed(
            "reset".to_string(),
        )));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn alternation_passes_through() {
        let (mut reporter, mut rx) = reporter();
        reporter.emit(ConnectionStatus::QueueFull);
        reporter.emit(ConnectionStatus::QueueOk);
        reporter.emit(ConnectionStatus::QueueFull);
        let mut seen = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            seen.push(ev.status);
        }
        assert_eq!(
            seen,
            vec![
                ConnectionStatus::QueueFull,
                ConnectionStatus::QueueOk,
                ConnectionStatus::QueueFull
            ]
        );
    }

    #[test]
    fn events_carry_endpoint_and_cluster_id() {
        let (mut reporter, mut rx) = reporter();
        reporter.set_cluster_id(Some(Bytes::from("node-1")));
        reporter.emit(ConnectionStatus::Up);
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.host, "localhost");
        assert_eq!(ev.port, 6379);
        assert_eq!(ev.cluster_id, Some(Bytes::from("node-1")));
    }

    #[test]
    fn missing_observer_is_fine() {
        let mut reporter = StatusReporter::new("h".to_string(), 1, None);
        reporter.emit(ConnectionStatus::Up);
    }
}
