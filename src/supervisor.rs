//! Reconnect supervisor
//!
//! A long-lived task that owns the connect → handshake → forward loop. It
//! never touches queue state; everything it learns is sent to the core as
//! an [`Event`]. Each established connection gets a fresh epoch so the core
//! can discard events from defunct connections.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::Event;
use crate::connection::{ConnectionEvent, Transport};
use crate::core::config::ClientConfig;
use crate::handshake::Handshake;

pub(crate) struct Supervisor {
    host: String,
    port: u16,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    core: mpsc::UnboundedSender<Event>,
}

impl Supervisor {
    pub(crate) fn new(
        host: String,
        port: u16,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        core: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            host,
            port,
            config,
            transport,
            core,
        }
    }

    /// Drive the connection until the core goes away.
    pub(crate) async fn run(self) {
        let mut epoch: u64 = 0;

        'reconnect: loop {
            let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
            let handle = match self
                .transport
                .connect(&self.host, self.port, &self.config, conn_tx)
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    debug!("connect to {}:{} failed: {}", self.host, self.port, e);
                    if self.send(Event::ConnectError {
                        reason: e.to_string(),
                    }) {
                        return;
                    }
                    sleep(self.config.reconnect_wait).await;
                    continue 'reconnect;
                }
            };
            epoch += 1;

            // handshake, retrying init failures on the same socket
            let handshake = Handshake::new(&self.config);
            let cluster_id = loop {
                let Some(batch) = handshake.batch() else {
                    break None;
                };
                handle.submit(batch);
                match conn_rx.recv().await {
                    Some(ConnectionEvent::Reply(reply)) => match handshake.interpret(reply) {
                        Ok(cluster_id) => break cluster_id,
                        Err(errors) => {
                            warn!("handshake rejected: {:?}", errors);
                            if self.send(Event::InitError { errors }) {
                                return;
                            }
                            sleep(self.config.reconnect_wait).await;
                        }
                    },
                    Some(ConnectionEvent::Closed(reason)) => {
                        if self.send(Event::SocketClosed { epoch, reason }) {
                            return;
                        }
                        continue 'reconnect;
                    }
                    None => {
                        let reason = "connection task terminated".to_string();
                        if self.send(Event::SocketClosed { epoch, reason }) {
                            return;
                        }
                        continue 'reconnect;
                    }
                }
            };

            info!("connected to {}:{} (epoch {})", self.host, self.port, epoch);
            if self.send(Event::Connected {
                epoch,
                handle,
                cluster_id,
            }) {
                return;
            }

            // forward replies until the socket goes away
            loop {
                match conn_rx.recv().await {
                    Some(ConnectionEvent::Reply(value)) => {
                        if self.send(Event::Reply { epoch, value }) {
                            return;
                        }
                    }
                    Some(ConnectionEvent::Closed(reason)) => {
                        debug!("socket closed (epoch {}): {}", epoch, reason);
                        if self.send(Event::SocketClosed { epoch, reason }) {
                            return;
                        }
                        continue 'reconnect;
                    }
                    None => {
                        let reason = "connection task terminated".to_string();
                        if self.send(Event::SocketClosed { epoch, reason }) {
                            return;
                        }
                        continue 'reconnect;
                    }
                }
            }
        }
    }

    /// Returns true when the core is gone and the supervisor should exit.
    fn send(&self, event: Event) -> bool {
        self.core.send(event).is_err()
    }
}
