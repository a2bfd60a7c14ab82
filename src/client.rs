//! Client surface and the core state machine
//!
//! One spawned task owns every piece of mutable state: the waiting and
//! pending queues, the connection handle, the node-down timer, and the
//! status reporter. Caller submissions, supervisor signals, replies, and
//! timer firings all arrive as [`Event`]s on a single channel and are
//! handled to completion one at a time, so no handler ever observes a
//! half-applied transition.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionHandle, TcpTransport, Transport};
use crate::core::config::ClientConfig;
use crate::core::error::{RedisError, RedisResult};
use crate::core::value::RespValue;
use crate::protocol::Payload;
use crate::queue::Fifo;
use crate::status::{ConnectionStatus, DownReason, StatusReporter};
use crate::supervisor::Supervisor;

/// One-shot reply destination for an accepted command.
///
/// The core consumes it exactly once over the command's lifetime: with the
/// server reply, or with the error that dropped the command.
pub type ReplySink = oneshot::Sender<RedisResult<RespValue>>;

const STOPPED_REASON: &str = "client terminated";

/// Messages driving the core state machine.
pub(crate) enum Event {
    Command {
        payload: Payload,
        sink: ReplySink,
    },
    Connected {
        epoch: u64,
        handle: Box<dyn ConnectionHandle>,
        cluster_id: Option<Bytes>,
    },
    ConnectError {
        reason: String,
    },
    InitError {
        errors: Vec<String>,
    },
    SocketClosed {
        epoch: u64,
        reason: String,
    },
    Reply {
        epoch: u64,
        value: RespValue,
    },
    NodeDownTick {
        token: u64,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

/// Handle to a single-node client.
///
/// Cheap to clone; all clones feed the same serialized core task, so
/// commands from one caller are submitted in call order. The background
/// tasks run until [`Client::stop`] is called or the runtime shuts down.
#[derive(Debug, Clone)]
pub struct Client {
    events: mpsc::UnboundedSender<Event>,
}

impl Client {
    /// Start a client for the given endpoint over the default TCP
    /// transport. The connection is established in the background;
    /// commands submitted before it is up wait in the queue.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `RedisError::Config` for an inconsistent configuration.
    pub fn start(host: impl Into<String>, port: u16, config: ClientConfig) -> RedisResult<Self> {
        Self::start_with_transport(host, port, config, Arc::new(TcpTransport))
    }

    /// Start a client over a custom [`Transport`] implementation.
    ///
    /// # Errors
    ///
    /// Returns `RedisError::Config` for an inconsistent configuration.
    pub fn start_with_transport(
        host: impl Into<String>,
        port: u16,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> RedisResult<Self> {
        config.validate()?;
        let host = host.into();

        let (events, inbox) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(
            host.clone(),
            port,
            config.clone(),
            transport,
            events.clone(),
        );
        let supervisor = tokio::spawn(supervisor.run());

        let reporter = StatusReporter::new(host.clone(), port, config.status_channel.clone());
        let core = Core::new(host, port, config, reporter, events.clone(), supervisor);
        tokio::spawn(core.run(inbox));

        Ok(Self { events })
    }

    /// Submit a command and await its reply.
    ///
    /// # Errors
    ///
    /// Returns `QueueOverflow`, `NodeDown`, or `Stopped` when the command
    /// is dropped instead of served.
    pub async fn command(&self, payload: Payload) -> RedisResult<RespValue> {
        let (sink, reply) = oneshot::channel();
        self.command_async(payload, sink);
        match reply.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RedisError::Stopped(STOPPED_REASON.to_string())),
        }
    }

    /// Submit a command with a caller-side deadline.
    ///
    /// On expiry the reply is abandoned but the command still occupies its
    /// queue slot until the server answers; this is the documented cost of
    /// keeping the pipeline free of per-command timers.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` on expiry, otherwise as [`Client::command`].
    pub async fn command_timeout(
        &self,
        payload: Payload,
        deadline: Duration,
    ) -> RedisResult<RespValue> {
        match tokio::time::timeout(deadline, self.command(payload)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RedisError::Timeout),
        }
    }

    /// Submit a command without waiting; the sink is consumed exactly once
    /// with the eventual outcome.
    pub fn command_async(&self, payload: Payload, sink: ReplySink) {
        if let Err(mpsc::error::SendError(event)) = self.events.send(Event::Command { payload, sink })
        {
            if let Event::Command { sink, .. } = event {
                let _ = sink.send(Err(RedisError::Stopped(STOPPED_REASON.to_string())));
            }
        }
    }

    /// Stop the client: every queued command is answered with `Stopped`,
    /// in-flight wire replies are abandoned, and the background tasks
    /// terminate. Idempotent.
    pub async fn stop(&self) {
        let (ack, done) = oneshot::channel();
        if self.events.send(Event::Stop { ack }).is_ok() {
            let _ = done.await;
        }
    }
}

struct QueuedCommand {
    payload: Payload,
    sink: ReplySink,
}

struct Connection {
    epoch: u64,
    handle: Box<dyn ConnectionHandle>,
}

/// The single-task serializer owning all client state.
struct Core {
    host: String,
    port: u16,
    config: ClientConfig,
    waiting: Fifo<QueuedCommand>,
    pending: Fifo<QueuedCommand>,
    connection: Option<Connection>,
    node_down: bool,
    node_down_token: Option<u64>,
    timer_seq: u64,
    queue_full_sent: bool,
    reporter: StatusReporter,
    events: mpsc::UnboundedSender<Event>,
    supervisor: JoinHandle<()>,
}

impl Core {
    fn new(
        host: String,
        port: u16,
        config: ClientConfig,
        reporter: StatusReporter,
        events: mpsc::UnboundedSender<Event>,
        supervisor: JoinHandle<()>,
    ) -> Self {
        Self {
            host,
            port,
            config,
            waiting: Fifo::new(),
            pending: Fifo::new(),
            connection: None,
            node_down: false,
            node_down_token: None,
            timer_seq: 0,
            queue_full_sent: false,
            reporter,
            events,
            supervisor,
        }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = inbox.recv().await {
            if self.handle(event) {
                break;
            }
        }
        debug!("client core for {}:{} terminated", self.host, self.port);
    }

    /// Process one event to completion. Returns true on stop.
    fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Command { payload, sink } => {
                if self.node_down {
                    let _ = sink.send(Err(RedisError::NodeDown));
                } else {
                    self.waiting.push_back(QueuedCommand { payload, sink });
                    self.drive();
                }
            }
            Event::Connected {
                epoch,
                handle,
                cluster_id,
            } => {
                self.node_down_token = None;
                self.node_down = false;
                self.reporter.set_cluster_id(cluster_id);
                self.connection = Some(Connection { epoch, handle });
                self.reporter.emit(ConnectionStatus::Up);
                self.drive();
            }
            Event::ConnectError { reason } => {
                self.disconnected(DownReason::ConnectError(reason));
            }
            Event::InitError { errors } => {
                self.disconnected(DownReason::InitError(errors));
            }
            Event::SocketClosed { epoch, reason } => {
                if self.connection.as_ref().is_some_and(|c| c.epoch != epoch) {
                    debug!("ignoring stale socket-closed (epoch {})", epoch);
                } else {
                    self.disconnected(DownReason::SocketClosed(reason));
                }
            }
            Event::Reply { epoch, value } => {
                if self.connection.as_ref().is_some_and(|c| c.epoch == epoch) {
                    match self.pending.pop_front() {
                        Some(command) => {
                            let _ = command.sink.send(Ok(value));
                            self.drive();
                        }
                        None => warn!(
                            "reply from {}:{} with nothing pending, discarding",
                            self.host, self.port
                        ),
                    }
                } else {
                    debug!("discarding reply from defunct connection (epoch {})", epoch);
                }
            }
            Event::NodeDownTick { token } => {
                if self.node_down_token == Some(token) {
                    self.node_down_token = None;
                    self.declare_node_down();
                }
            }
            Event::Stop { ack } => {
                self.shutdown("normal");
                let _ = ack.send(());
                return true;
            }
        }
        false
    }

    /// The pipeline driver: runs exactly once at the end of every event
    /// that may change queue state.
    ///
    /// Drains waiting into pending within the in-flight window, then
    /// enforces the overflow policy. The waiting queue may momentarily
    /// exceed its bound during admission so the caller sees a successful
    /// accept; any excess is dropped from the head here, before the
    /// handler returns.
    fn drive(&mut self) {
        if let Some(connection) = &self.connection {
            while self.pending.len() < self.config.max_pending {
                let Some(command) = self.waiting.pop_front() else {
                    break;
                };
                connection.handle.submit(command.payload.clone());
                self.pending.push_back(command);
            }
        }

        if self.waiting.len() > self.config.max_waiting {
            if !self.queue_full_sent {
                self.queue_full_sent = true;
                self.reporter.emit(ConnectionStatus::QueueFull);
            }
            let mut dropped = 0usize;
            while self.waiting.len() > self.config.max_waiting {
                if let Some(command) = self.waiting.pop_front() {
                    let _ = command.sink.send(Err(RedisError::QueueOverflow));
                    dropped += 1;
                }
            }
            warn!(
                "waiting queue for {}:{} over {} commands, dropped {} oldest",
                self.host, self.port, self.config.max_waiting, dropped
            );
        } else if self.queue_full_sent && self.waiting.len() < self.config.queue_ok_level {
            self.queue_full_sent = false;
            self.reporter.emit(ConnectionStatus::QueueOk);
        }
    }

    /// Shared handling for connect errors, handshake failures, and socket
    /// closure: replay pending ahead of waiting, report, and start the
    /// node-down countdown unless one is already running.
    fn disconnected(&mut self, reason: DownReason) {
        self.connection = None;
        let pending = mem::take(&mut self.pending);
        self.waiting.prepend(pending);
        self.drive();
        self.reporter.emit(ConnectionStatus::Down(reason));
        if !self.node_down && self.node_down_token.is_none() {
            self.arm_node_down_timer();
        }
    }

    fn arm_node_down_timer(&mut self) {
        self.timer_seq += 1;
        let token = self.timer_seq;
        self.node_down_token = Some(token);
        let events = self.events.clone();
        let timeout = self.config.node_down_timeout;
        tokio::spawn(async move {
            sleep(timeout).await;
            let _ = events.send(Event::NodeDownTick { token });
        });
    }

    /// The node-down timer fired with no connection in between: flush both
    /// queues and reject new submissions until the next `Connected`.
    fn declare_node_down(&mut self) {
        warn!(
            "{}:{} unreachable for {:?}, declaring node down",
            self.host, self.port, self.config.node_down_timeout
        );
        self.node_down = true;
        for command in self.pending.drain() {
            let _ = command.sink.send(Err(RedisError::NodeDown));
        }
        for command in self.waiting.drain() {
            let _ = command.sink.send(Err(RedisError::NodeDown));
        }
    }

    fn shutdown(&mut self, reason: &str) {
        info!("stopping client for {}:{}", self.host, self.port);
        self.connection = None;
        for command in self.pending.drain() {
            let _ = command.sink.send(Err(RedisError::Stopped(reason.to_string())));
        }
        for command in self.waiting.drain() {
            let _ = command.sink.send(Err(RedisError::Stopped(reason.to_string())));
        }
        self.reporter
            .emit(ConnectionStatus::Down(DownReason::ClientStopped(
                reason.to_string(),
            )));
        self.supervisor.abort();
    }
}
