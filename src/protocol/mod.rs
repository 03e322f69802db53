//! Wire protocol types.
//!
//! This module defines the frames exchanged with the chat server and the
//! close codes that end a transport session.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `ControlFrame::Ping` | Local → Remote | Heartbeat probe |
//! | `ControlFrame::Pong` | Remote → Local | Heartbeat reply |
//! | `OutboundEnvelope` | Local → Remote | Caller payload with message id |
//! | `InboundFrame::Application` | Remote → Local | Opaque server payload |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `close` | Close codes and reasons |
//! | `frame` | Frame encoding and classification |

// ============================================================================
// Submodules
// ============================================================================

/// Close codes and reasons.
pub mod close;

/// Frame encoding and classification.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use close::{CloseCode, CloseReason};
pub use frame::{ControlFrame, InboundFrame, OutboundEnvelope};
