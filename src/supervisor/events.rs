//! Supervisor events, callbacks and subscriptions.
//!
//! Events reach callers two ways:
//!
//! | Mechanism | Registered | Delivery |
//! |-----------|------------|----------|
//! | [`EventHandlers`] | At construction | Called inline on the supervisor task |
//! | [`Subscription`] | Any time | Buffered channel, read with `recv().await` |
//!
//! Both see the same events in the same order. Callbacks must not block.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Error;
use crate::identifiers::{Epoch, SubscriptionId};
use crate::protocol::CloseReason;

// ============================================================================
// Event
// ============================================================================

/// Something the supervisor reports to callers.
#[derive(Debug, Clone)]
pub enum Event {
    /// A session opened.
    Open {
        /// Epoch of the new session.
        epoch: Epoch,
    },
    /// An application frame arrived. Pongs are never surfaced.
    Message(Value),
    /// The session ended, intentionally or not.
    Disconnect(CloseReason),
    /// Reconnect attempts are exhausted. Emitted once per exhaustion.
    FatalError(Arc<Error>),
}

impl Event {
    /// Returns `true` for [`Event::Open`].
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns `true` for [`Event::Disconnect`].
    #[inline]
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnect(_))
    }

    /// Returns `true` for [`Event::FatalError`].
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalError(_))
    }
}

// ============================================================================
// EventHandlers
// ============================================================================

/// Callback for [`Event::Open`].
pub type OnOpenCallback = Arc<dyn Fn(Epoch) + Send + Sync>;

/// Callback for [`Event::Message`].
pub type OnMessageCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback for [`Event::Disconnect`].
pub type OnDisconnectCallback = Arc<dyn Fn(&CloseReason) + Send + Sync>;

/// Callback for [`Event::FatalError`].
pub type OnFatalErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Optional callbacks invoked for each event.
///
/// # Example
///
/// ```ignore
/// let handlers = EventHandlers::new()
///     .on_open(|epoch| println!("open #{epoch}"))
///     .on_disconnect(|reason| println!("lost: {reason}"));
/// ```
#[derive(Clone, Default)]
pub struct EventHandlers {
    on_open: Option<OnOpenCallback>,
    on_message: Option<OnMessageCallback>,
    on_disconnect: Option<OnDisconnectCallback>,
    on_fatal_error: Option<OnFatalErrorCallback>,
}

impl EventHandlers {
    /// Creates an empty set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open callback.
    #[must_use]
    pub fn on_open(mut self, callback: impl Fn(Epoch) + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(callback));
        self
    }

    /// Sets the message callback.
    #[must_use]
    pub fn on_message(mut self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(callback));
        self
    }

    /// Sets the disconnect callback.
    #[must_use]
    pub fn on_disconnect(
        mut self,
        callback: impl Fn(&CloseReason) + Send + Sync + 'static,
    ) -> Self {
        self.on_disconnect = Some(Arc::new(callback));
        self
    }

    /// Sets the fatal error callback.
    #[must_use]
    pub fn on_fatal_error(mut self, callback: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_fatal_error = Some(Arc::new(callback));
        self
    }

    /// Invokes the callback matching `event`.
    fn dispatch(&self, event: &Event) {
        match event {
            Event::Open { epoch } => {
                if let Some(cb) = &self.on_open {
                    cb(*epoch);
                }
            }
            Event::Message(value) => {
                if let Some(cb) = &self.on_message {
                    cb(value);
                }
            }
            Event::Disconnect(reason) => {
                if let Some(cb) = &self.on_disconnect {
                    cb(reason);
                }
            }
            Event::FatalError(error) => {
                if let Some(cb) = &self.on_fatal_error {
                    cb(error);
                }
            }
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_fatal_error", &self.on_fatal_error.is_some())
            .finish()
    }
}

// ============================================================================
// SubscriberRegistry
// ============================================================================

/// Live subscriptions, shared between handles and the supervisor task.
#[derive(Clone, Default)]
pub(crate) struct SubscriberRegistry {
    inner: Arc<Mutex<FxHashMap<SubscriptionId, mpsc::UnboundedSender<Event>>>>,
}

impl SubscriberRegistry {
    /// Registers a new subscription.
    pub(crate) fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId::next();
        self.inner.lock().insert(id, tx);
        trace!(%id, "Subscription registered");

        Subscription {
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Delivers `event` to every subscription, dropping closed ones.
    pub(crate) fn publish(&self, event: &Event) {
        self.inner
            .lock()
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Drops every sender so subscriptions see the end of the stream.
    pub(crate) fn close_all(&self) {
        self.inner.lock().clear();
    }

    /// Number of live subscriptions.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn remove(&self, id: SubscriptionId) {
        if self.inner.lock().remove(&id).is_some() {
            trace!(%id, "Subscription removed");
        }
    }
}

// ============================================================================
// EventEmitter
// ============================================================================

/// Fans events out to callbacks and subscriptions.
pub(crate) struct EventEmitter {
    handlers: EventHandlers,
    subscribers: SubscriberRegistry,
}

impl EventEmitter {
    pub(crate) fn new(handlers: EventHandlers, subscribers: SubscriberRegistry) -> Self {
        Self {
            handlers,
            subscribers,
        }
    }

    /// Emits `event` to callbacks first, then subscriptions.
    pub(crate) fn emit(&self, event: Event) {
        self.handlers.dispatch(&event);
        self.subscribers.publish(&event);
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Buffered stream of supervisor events.
///
/// Events emitted before subscribing are not replayed. Dropping the
/// subscription unregisters it.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Event>,
    registry: SubscriberRegistry,
}

impl Subscription {
    /// Subscription identifier.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the supervisor has stopped and the buffer is empty.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Returns a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Unregisters the subscription.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
