//! Transport layer.
//!
//! A transport opens one physical connection per call. The returned
//! session is a thin handle: it can hand frames to the connection and
//! close it, and it reports what happens on the wire through an event
//! channel. Retry, heartbeat and queueing all live in the supervisor, so
//! any push-capable duplex stream can sit behind this trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   open(url)    ┌──────────────────┐
//! │   Supervisor    │───────────────►│    Transport     │
//! │                 │                └────────┬─────────┘
//! │  send / close   │   OpenedSession         │
//! │ ───────────────►│◄────────────────────────┘
//! │  TransportEvent │   session + events
//! │ ◄───────────────│
//! └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | tokio-tungstenite client transport |
//! | `memory` | In-process transport for tests and embedding |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;
use crate::protocol::CloseReason;

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport.
pub mod memory;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryPeer, MemoryPeers, MemoryTransport, OpenAttempt, OpenBehavior};
pub use websocket::{WebSocketSession, WebSocketTransport};

// ============================================================================
// TransportEvent
// ============================================================================

/// Something that happened on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Message(String),
    /// A non-terminal error was observed; a `Closed` event follows if the
    /// connection is lost.
    Error(String),
    /// The connection ended. No further events follow.
    Closed(CloseReason),
}

// ============================================================================
// OpenedSession
// ============================================================================

/// A freshly opened connection.
pub struct OpenedSession {
    /// Handle for sending and closing.
    pub session: Box<dyn TransportSession>,
    /// Events observed on the connection, in arrival order.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl std::fmt::Debug for OpenedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedSession").finish_non_exhaustive()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Opens physical connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens one connection to `url`.
    ///
    /// Resolves once the connection is usable. Events must not be lost
    /// between this returning and the caller reading `events`.
    ///
    /// # Errors
    ///
    /// Any error means this attempt failed; the supervisor schedules a retry.
    async fn open(&self, url: &Url) -> Result<OpenedSession>;
}

/// Handle to one open connection.
pub trait TransportSession: Send + Sync {
    /// Hands a text frame to the connection.
    ///
    /// Returns `false` if the frame was not accepted and must be retried.
    fn send(&self, frame: String) -> bool;

    /// Closes the connection with `reason`.
    fn force_close(&self, reason: CloseReason);
}
