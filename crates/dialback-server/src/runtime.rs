//! The dialback runtime: one task owning all dialback state.
//!
//! Transport code talks to the runtime through a cloneable
//! [`RuntimeHandle`] and receives the effects it must perform as
//! [`TransportCommand`]s. Events are applied strictly in arrival order, so
//! cross-connection updates (a verdict authenticating a multiplexing parent)
//! never race.
//!
//! The event side is bounded and applies backpressure to callers. The command
//! side is unbounded: the runtime never waits on the transport, so a
//! transport may call back into a [`RuntimeHandle`] while handling a command.

use dialback_core::{ConnHandle, Connection, Dialback, DialbackConfig, Event, Host, SecretStore};
use dialback_types::{DialbackFeature, DialbackMessage, StreamClose};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const EVENT_BUFFER: usize = 256;

/// Errors returned by [`RuntimeHandle`] calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The runtime task has exited.
    #[error("dialback runtime has stopped")]
    Stopped,
}

/// An effect the transport layer has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write a dialback element on a stream.
    Send {
        conn: ConnHandle,
        message: DialbackMessage,
    },
    /// Deliver a dialback element to the server for `to`, over whatever
    /// outgoing stream the transport holds or opens for `from -> to`.
    Route {
        from: String,
        to: String,
        message: DialbackMessage,
    },
    /// Close a stream with a stream error.
    Close { conn: ConnHandle, close: StreamClose },
    /// Reject stanzas that were waiting on a stream whose dialback failed.
    Bounce {
        conn: ConnHandle,
        reason: String,
        stanzas: Vec<String>,
    },
    /// A stream was authenticated for `domain`.
    Authenticated { conn: ConnHandle, domain: String },
    /// Write stanzas that were waiting for authentication.
    Deliver {
        conn: ConnHandle,
        stanzas: Vec<String>,
    },
}

enum HostEvent {
    Open {
        connection: Connection,
        reply: oneshot::Sender<ConnHandle>,
    },
    Closed(ConnHandle),
    Dispatch(ConnHandle, Event),
    Enqueue(ConnHandle, String),
    Advertise {
        conn: ConnHandle,
        reply: oneshot::Sender<Option<DialbackFeature>>,
    },
    Inspect {
        conn: ConnHandle,
        reply: oneshot::Sender<Option<Connection>>,
    },
}

impl std::fmt::Debug for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { .. } => f.write_str("Open"),
            Self::Closed(conn) => write!(f, "Closed({conn})"),
            Self::Dispatch(conn, event) => write!(f, "Dispatch({conn}, {event:?})"),
            Self::Enqueue(conn, _) => write!(f, "Enqueue({conn})"),
            Self::Advertise { conn, .. } => write!(f, "Advertise({conn})"),
            Self::Inspect { conn, .. } => write!(f, "Inspect({conn})"),
        }
    }
}

/// [`Host`] implementation backed by the configured domains.
///
/// Effects are buffered and flushed to the transport after each event.
#[derive(Default)]
struct LocalHost {
    secrets: HashMap<String, String>,
    queues: HashMap<ConnHandle, Vec<String>>,
    outbox: Vec<TransportCommand>,
}

impl SecretStore for LocalHost {
    fn secret_for(&self, domain: &str) -> Option<String> {
        self.secrets.get(domain).cloned()
    }
}

impl Host for LocalHost {
    fn serves(&self, domain: &str) -> bool {
        self.secrets.contains_key(domain)
    }

    fn route_to_remote(&mut self, from: &str, to: &str, message: DialbackMessage) {
        self.outbox.push(TransportCommand::Route {
            from: from.to_string(),
            to: to.to_string(),
            message,
        });
    }

    fn send(&mut self, conn: ConnHandle, message: DialbackMessage) {
        self.outbox.push(TransportCommand::Send { conn, message });
    }

    fn close(&mut self, conn: ConnHandle, close: StreamClose) {
        self.outbox.push(TransportCommand::Close { conn, close });
    }

    fn bounce_queued(&mut self, conn: ConnHandle, reason: &str) -> bool {
        let Some(stanzas) = self.queues.remove(&conn).filter(|q| !q.is_empty()) else {
            return false;
        };
        self.outbox.push(TransportCommand::Bounce {
            conn,
            reason: reason.to_string(),
            stanzas,
        });
        true
    }

    fn on_authenticated(&mut self, conn: ConnHandle, domain: &str) {
        self.outbox.push(TransportCommand::Authenticated {
            conn,
            domain: domain.to_string(),
        });
        if let Some(stanzas) = self.queues.remove(&conn).filter(|q| !q.is_empty()) {
            self.outbox.push(TransportCommand::Deliver { conn, stanzas });
        }
    }
}

/// Cloneable handle for feeding events to the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    events: mpsc::Sender<HostEvent>,
}

impl RuntimeHandle {
    /// Registers a stream the transport accepted or connected.
    pub async fn open(&self, connection: Connection) -> Result<ConnHandle, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HostEvent::Open { connection, reply }).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    /// The transport closed a stream.
    pub async fn closed(&self, conn: ConnHandle) -> Result<(), RuntimeError> {
        self.submit(HostEvent::Closed(conn)).await
    }

    /// Something happened on a stream.
    pub async fn dispatch(&self, conn: ConnHandle, event: Event) -> Result<(), RuntimeError> {
        self.submit(HostEvent::Dispatch(conn, event)).await
    }

    /// Queues a stanza for an outgoing stream. It is delivered once the
    /// stream authenticates and bounced if dialback fails.
    pub async fn enqueue(
        &self,
        conn: ConnHandle,
        stanza: impl Into<String>,
    ) -> Result<(), RuntimeError> {
        self.submit(HostEvent::Enqueue(conn, stanza.into())).await
    }

    /// The dialback feature to advertise on an inbound stream.
    pub async fn advertised_features(
        &self,
        conn: ConnHandle,
    ) -> Result<Option<DialbackFeature>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HostEvent::Advertise { conn, reply }).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    /// A snapshot of a stream's dialback state.
    pub async fn connection(&self, conn: ConnHandle) -> Result<Option<Connection>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HostEvent::Inspect { conn, reply }).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    async fn submit(&self, event: HostEvent) -> Result<(), RuntimeError> {
        self.events
            .send(event)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }
}

/// The task that owns the dialback state.
pub struct Runtime {
    dialback: Dialback,
    host: LocalHost,
    events: mpsc::Receiver<HostEvent>,
    commands: mpsc::UnboundedSender<TransportCommand>,
}

impl Runtime {
    /// Creates a runtime for the hosted domains in `secrets`.
    ///
    /// Returns the runtime, the handle for feeding it and the receiver for
    /// the transport commands it produces.
    pub fn new(
        config: DialbackConfig,
        secrets: HashMap<String, String>,
    ) -> (Self, RuntimeHandle, mpsc::UnboundedReceiver<TransportCommand>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let runtime = Self {
            dialback: Dialback::new(config),
            host: LocalHost {
                secrets,
                ..LocalHost::default()
            },
            events: event_rx,
            commands: command_tx,
        };
        (runtime, RuntimeHandle { events: event_tx }, command_rx)
    }

    /// Spawns the runtime on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Processes events until every [`RuntimeHandle`] is dropped or the
    /// transport stops reading commands.
    pub async fn run(mut self) {
        tracing::info!(
            hosts = self.host.secrets.len(),
            require_encryption = self.dialback.config().require_encryption,
            "dialback runtime started"
        );

        'events: while let Some(event) = self.events.recv().await {
            tracing::trace!(?event, "host event");
            self.apply(event);

            for command in std::mem::take(&mut self.host.outbox) {
                if self.commands.send(command).is_err() {
                    tracing::warn!("transport stopped reading commands, shutting down dialback runtime");
                    break 'events;
                }
            }
        }

        self.dialback.unload();
        tracing::info!(
            connections = self.dialback.connections().len(),
            pending = self.dialback.pending().len(),
            "dialback runtime stopped"
        );
    }

    fn apply(&mut self, event: HostEvent) {
        match event {
            HostEvent::Open { connection, reply } => {
                let handle = self.dialback.open(connection);
                if reply.send(handle).is_err() {
                    tracing::debug!(conn = %handle, "opener went away before registration completed");
                }
            }
            HostEvent::Closed(conn) => {
                self.host.bounce_queued(conn, "stream closed before authentication");
                self.dialback.destroy(conn);
            }
            HostEvent::Dispatch(conn, event) => {
                self.dialback.dispatch(&mut self.host, conn, event);
            }
            HostEvent::Enqueue(conn, stanza) => match self.dialback.connection(conn) {
                Some(c) if c.is_authenticated() => {
                    self.host.outbox.push(TransportCommand::Deliver {
                        conn,
                        stanzas: vec![stanza],
                    });
                }
                Some(_) => self.host.queues.entry(conn).or_default().push(stanza),
                None => tracing::debug!(conn = %conn, "dropping stanza for unknown stream"),
            },
            HostEvent::Advertise { conn, reply } => {
                let _ = reply.send(self.dialback.advertised_features(conn));
            }
            HostEvent::Inspect { conn, reply } => {
                let _ = reply.send(self.dialback.connection(conn).cloned());
            }
        }
    }
}
