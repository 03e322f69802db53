//! Chat Link - Resilient chat session core.
//!
//! This library keeps one logical chat connection alive over an unreliable
//! push transport: it reconnects with exponential backoff, detects silent
//! peers with an application-level heartbeat, and delivers outbound
//! messages in order across reconnects.
//!
//! # Architecture
//!
//! A single background task owns all connection state:
//!
//! - **Supervisor**: state machine driven by caller commands, transport
//!   signals and timer fires, all delivered over channels
//! - **Transport**: opens physical sessions (WebSocket by default)
//! - **Outbound queue**: FIFO drained on every open
//! - **Timers**: keyed, cancellable heartbeat, pong deadline and reconnect
//!
//! Every transport session gets a new epoch. Events from older epochs are
//! ignored, so a replaced socket can never disturb the live one.
//!
//! # Quick Start
//!
//! ```no_run
//! use chat_link::{ConnectionConfig, Event, Result, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConnectionConfig::builder()
//!         .endpoint("wss://chat.example.com/ws")
//!         .session_id("session-42")
//!         .credential("secret-token")
//!         .build()?;
//!
//!     let supervisor = Supervisor::spawn(config)?;
//!     let mut events = supervisor.subscribe();
//!
//!     supervisor.connect()?;
//!     supervisor.send(&serde_json::json!({ "text": "hello" }))?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Message(value) => println!("received: {value}"),
//!             Event::FatalError(error) => {
//!                 eprintln!("giving up: {error}");
//!                 break;
//!             }
//!             other => println!("{other:?}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Connection parameters and builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Message, epoch and subscription IDs |
//! | [`protocol`] | Wire frames and close codes |
//! | [`queue`] | Outbound FIFO and admission gauge |
//! | [`supervisor`] | Connection supervision |
//! | [`timer`] | Cancellable timer facility |
//! | [`transport`] | Transport trait, WebSocket and in-memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Connection configuration.
///
/// Use [`ConnectionConfig::builder()`] to create a validated configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire frames and close codes.
pub mod protocol;

/// Outbound message queue.
pub mod queue;

/// Connection supervision.
///
/// [`Supervisor`] is the entry point.
pub mod supervisor;

/// Timer facility used by the supervisor.
pub mod timer;

/// Transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{ConnectionConfig, ConnectionConfigBuilder, Credential};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientMessageId, Epoch, SubscriptionId};

// Protocol types
pub use protocol::{CloseCode, CloseReason};

// Supervisor types
pub use supervisor::{
    ConnectionState, Event, EventHandlers, Subscription, Supervisor, SupervisorBuilder,
    SupervisorStats,
};

// Transport types
pub use transport::{MemoryTransport, Transport, TransportEvent, TransportSession, WebSocketTransport};
