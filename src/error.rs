//! Error types for the chat session core.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use chat_link::{Result, Supervisor};
//!
//! fn post(supervisor: &Supervisor) -> Result<()> {
//!     let id = supervisor.send(&serde_json::json!({ "text": "hello" }))?;
//!     println!("queued {id}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`] |
//! | Supervisor | [`Error::QueueFull`], [`Error::ReconnectExhausted`], [`Error::SupervisorStopped`] |
//! | Protocol | [`Error::FrameTooLarge`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::ParseError as UrlError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a [`ConnectionConfig`](crate::ConnectionConfig) is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Connection URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection attempt failed.
    ///
    /// Returned by transports when a session cannot be opened.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Supervisor Errors
    // ========================================================================
    /// Outbound queue is at capacity.
    ///
    /// Returned by [`Supervisor::send`](crate::Supervisor::send) so callers
    /// can apply backpressure while the connection is down.
    #[error("Outbound queue full ({capacity} messages waiting)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Automatic reconnection gave up.
    ///
    /// Surfaced through the fatal error event, never returned from `send`.
    #[error("Reconnect budget exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Reconnect attempts made before giving up.
        attempts: u32,
    },

    /// The supervisor task is no longer running.
    #[error("Supervisor stopped")]
    SupervisorStopped,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame exceeds the configured maximum length.
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Received frame length in bytes.
        len: usize,
        /// Configured maximum in bytes.
        max: usize,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(capacity: usize) -> Self {
        Self::QueueFull { capacity }
    }

    /// Creates a reconnect exhausted error.
    #[inline]
    pub fn reconnect_exhausted(attempts: u32) -> Self {
        Self::ReconnectExhausted { attempts }
    }

    /// Creates a frame too large error.
    #[inline]
    pub fn frame_too_large(len: usize, max: usize) -> Self {
        Self::FrameTooLarge { len, max }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::WebSocket(_)
                | Self::Io(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors are absorbed by the reconnect state machine.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_connection_error() || matches!(self, Self::QueueFull { .. })
    }

    /// Returns `true` if automatic recovery has stopped.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ReconnectExhausted { .. } | Self::SupervisorStopped
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
