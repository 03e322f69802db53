//! Connection supervision.
//!
//! The supervisor keeps one logical chat connection alive across any
//! number of physical transport sessions.
//!
//! # Responsibilities
//!
//! | Concern | Behavior |
//! |---------|----------|
//! | Reconnect | Exponential backoff `min(base * 2^n, cap)`, bounded by `max_retries` |
//! | Heartbeat | Ping every interval; close with 4000 when a ping goes unanswered past the pong timeout |
//! | Delivery | FIFO queue drained on every open; a refused handoff stays at the head |
//! | Isolation | Events from replaced sessions are dropped by epoch |
//! | Close | Intentional close cancels every timer and discards the queue |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `actor` | Background task and session pumps |
//! | `events` | Events, callbacks and subscriptions |
//! | `handle` | Public [`Supervisor`] handle and builder |
//! | `state` | Connection, heartbeat and reconnect state |

// ============================================================================
// Submodules
// ============================================================================

/// Background task.
mod actor;

/// Events, callbacks and subscriptions.
pub mod events;

/// Public handle and builder.
pub mod handle;

/// Connection, heartbeat and reconnect state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use actor::SupervisorStats;
pub use events::{Event, EventHandlers, Subscription};
pub use handle::{Supervisor, SupervisorBuilder};
pub use state::{Backoff, ConnectionState, HeartbeatState, ReconnectState};
