//! Public supervisor handle.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ClientMessageId, Epoch};
use crate::queue::OutboundMessage;
use crate::transport::{Transport, WebSocketTransport};

use super::actor::{Command, Shared, SupervisorCore, SupervisorStats};
use super::events::{EventHandlers, Subscription};
use super::state::ConnectionState;

// ============================================================================
// Supervisor
// ============================================================================

/// Handle to a supervised chat connection.
///
/// Cloning is cheap; all clones drive the same connection. The background
/// task closes the connection and exits once the last clone is dropped.
///
/// # Example
///
/// ```ignore
/// use chat_link::{ConnectionConfig, Supervisor};
///
/// let config = ConnectionConfig::builder()
///     .endpoint("wss://chat.example.com/ws")
///     .session_id("session-42")
///     .credential(token)
///     .build()?;
///
/// let supervisor = Supervisor::spawn(config)?;
/// let mut events = supervisor.subscribe();
/// supervisor.connect()?;
/// supervisor.send(&serde_json::json!({ "text": "hello" }))?;
/// ```
#[derive(Clone)]
pub struct Supervisor {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder(config: ConnectionConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }

    /// Spawns a supervisor over WebSocket with no callbacks.
    ///
    /// # Errors
    ///
    /// See [`SupervisorBuilder::spawn`].
    pub fn spawn(config: ConnectionConfig) -> Result<Self> {
        Self::builder(config).spawn()
    }

    /// Opens a session unless one is open or opening.
    ///
    /// After reconnects were exhausted this also restores the retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorStopped`] if the task has exited.
    pub fn connect(&self) -> Result<()> {
        self.post(Command::Connect)
    }

    /// Queues a payload for in-order delivery.
    ///
    /// Returns the message id immediately; delivery happens once a session
    /// is open.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `payload` cannot be serialized
    /// - [`Error::QueueFull`] if the queue is at capacity
    /// - [`Error::SupervisorStopped`] if the task has exited
    pub fn send<T>(&self, payload: &T) -> Result<ClientMessageId>
    where
        T: Serialize + ?Sized,
    {
        self.send_value(serde_json::to_value(payload)?)
    }

    /// Queues an already built JSON payload.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send), minus serialization.
    pub fn send_value(&self, payload: Value) -> Result<ClientMessageId> {
        let depth = &self.shared.depth;
        if !depth.try_reserve() {
            return Err(Error::queue_full(depth.capacity()));
        }

        let message = OutboundMessage::new(payload);
        let id = message.client_message_id;

        if self.commands.send(Command::Send(message)).is_err() {
            depth.release(1);
            return Err(Error::SupervisorStopped);
        }

        Ok(id)
    }

    /// Closes intentionally: no reconnect, queued messages discarded.
    ///
    /// Idempotent. A later [`connect`](Self::connect) starts over.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Subscribes to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.shared.subscribers.subscribe()
    }

    /// Number of live subscriptions.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    /// Current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.stats.read().state
    }

    /// Epoch of the newest session.
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.shared.stats.read().epoch
    }

    /// Messages accepted by [`send`](Self::send) and not yet handed off
    /// or discarded.
    #[inline]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.depth.current()
    }

    /// Snapshot of the supervisor.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        *self.shared.stats.read()
    }

    /// Returns `true` if the background task is still running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn post(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::SupervisorStopped)
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// SupervisorBuilder
// ============================================================================

/// Builder for [`Supervisor`].
pub struct SupervisorBuilder {
    config: ConnectionConfig,
    transport: Option<Arc<dyn Transport>>,
    handlers: EventHandlers,
}

impl SupervisorBuilder {
    /// Creates a builder using WebSocket and no callbacks.
    #[inline]
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            transport: None,
            handlers: EventHandlers::default(),
        }
    }

    /// Uses `transport` instead of WebSocket.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets event callbacks.
    #[must_use]
    pub fn handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Spawns the background task. Does not connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if called outside a tokio runtime
    /// - [`Error::InvalidUrl`] if the connection URL cannot be built
    pub fn spawn(self) -> Result<Supervisor> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Supervisor must be spawned within a tokio runtime"))?;

        let url = self.config.connection_url()?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));

        let shared = Arc::new(Shared::new(self.config.queue_capacity()));
        let (commands, command_rx) = mpsc::unbounded_channel();

        debug!(
            host = self.config.host(),
            session_id = self.config.session_id(),
            "Spawning supervisor"
        );

        let (core, mailboxes) =
            SupervisorCore::new(self.config, url, transport, self.handlers, Arc::clone(&shared));
        runtime.spawn(core.run(command_rx, mailboxes));

        Ok(Supervisor { commands, shared })
    }
}

impl fmt::Debug for SupervisorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("handlers", &self.handlers)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
