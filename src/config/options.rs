//! Immutable connection parameters.
//!
//! A [`ConnectionConfig`] is created once through
//! [`ConnectionConfig::builder()`] and handed to the supervisor. Nothing
//! mutates it afterwards; every reconnect uses the same values.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use chat_link::ConnectionConfig;
//!
//! let config = ConnectionConfig::builder()
//!     .endpoint("wss://chat.example.com/ws/chat")
//!     .session_id("conv-42")
//!     .credential("secret-token")
//!     .max_retries(5)
//!     .build()?;
//!
//! assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::builder::ConnectionConfigBuilder;

// ============================================================================
// Defaults
// ============================================================================

/// Interval between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Time allowed for a pong after the oldest unanswered ping.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// First reconnect delay.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Upper bound for reconnect delays.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_millis(30_000);

/// Reconnect attempts before a fatal error is reported.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Time allowed for one transport open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages allowed to wait in the outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Largest inbound frame accepted, in bytes.
pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

// ============================================================================
// Credential
// ============================================================================

/// Auth credential sent as the `token` query parameter.
///
/// `Debug` output is redacted so configs can be logged safely.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a credential string.
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw credential.
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the credential is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Per-session parameters for a [`Supervisor`](crate::Supervisor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub(crate) host: String,
    pub(crate) path: String,
    pub(crate) secure: bool,
    pub(crate) session_id: String,
    pub(crate) credential: Credential,
    pub(crate) max_retries: u32,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) pong_timeout: Duration,
    pub(crate) backoff_base: Duration,
    pub(crate) backoff_cap: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) queue_capacity: usize,
    pub(crate) max_frame_len: usize,
}

impl ConnectionConfig {
    /// Creates a new configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }

    /// Builds the session URL.
    ///
    /// Format: `<scheme>://<host>/<path>/<session_id>?token=<credential>&conversation_id=<session_id>`
    /// where the scheme is `wss` for secure configs and `ws` otherwise.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the host does not form a valid URL
    /// - [`Error::Config`] if the URL cannot carry a path
    pub fn connection_url(&self) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = Url::parse(&format!("{scheme}://{}/", self.host))?;

        url.path_segments_mut()
            .map_err(|()| Error::config(format!("URL cannot have a path: {}", self.host)))?
            .clear()
            .extend(self.path.split('/').filter(|segment| !segment.is_empty()))
            .push(&self.session_id);

        url.query_pairs_mut()
            .append_pair("token", self.credential.expose())
            .append_pair("conversation_id", &self.session_id);

        Ok(url)
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ConnectionConfig {
    /// Server host, optionally with port.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path prefix placed before the session id.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the secure scheme (`wss`) is used.
    #[inline]
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Session / conversation identifier.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Auth credential.
    #[inline]
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Reconnect attempts before the fatal error event.
    #[inline]
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Interval between heartbeat pings.
    #[inline]
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Time allowed for a pong before the session is declared dead.
    #[inline]
    #[must_use]
    pub const fn pong_timeout(&self) -> Duration {
        self.pong_timeout
    }

    /// First reconnect delay.
    #[inline]
    #[must_use]
    pub const fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Upper bound for reconnect delays.
    #[inline]
    #[must_use]
    pub const fn backoff_cap(&self) -> Duration {
        self.backoff_cap
    }

    /// Time allowed for one transport open.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Messages allowed to wait in the outbound queue.
    #[inline]
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Largest inbound frame accepted, in bytes.
    #[inline]
    #[must_use]
    pub const fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secure: bool) -> ConnectionConfig {
        ConnectionConfig::builder()
            .host("chat.example.com")
            .path("/ws/chat/")
            .secure(secure)
            .session_id("conv-42")
            .credential("tok en&x")
            .build()
            .expect("valid config")
    }

    #[test]
    fn test_secure_url() {
        let url = config(true).connection_url().expect("url");
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/ws/chat/conv-42");
    }

    #[test]
    fn test_insecure_url() {
        let url = config(false).connection_url().expect("url");
        assert_eq!(url.scheme(), "ws");
    }

    #[test]
    fn test_url_query_is_encoded() {
        let url = config(true).connection_url().expect("url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("token".to_string(), "tok en&x".to_string()),
                ("conversation_id".to_string(), "conv-42".to_string()),
            ]
        );
        assert!(url.as_str().contains("token=tok+en%26x"));
    }

    #[test]
    fn test_url_with_port_and_empty_path() {
        let config = ConnectionConfig::builder()
            .host("127.0.0.1:9000")
            .path("")
            .session_id("s1")
            .credential("t")
            .build()
            .expect("valid config");

        let url = config.connection_url().expect("url");
        assert_eq!(url.port(), Some(9000));
        assert_eq!(url.path(), "/s1");
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let config = config(true);
        let debug = format!("{config:?}");
        assert!(!debug.contains("tok en&x"));
        assert!(debug.contains("Credential(***)"));
    }

    #[test]
    fn test_defaults() {
        let config = config(true);
        assert_eq!(config.heartbeat_interval(), DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(config.pong_timeout(), Duration::from_secs(600));
        assert_eq!(config.backoff_base(), Duration::from_millis(1000));
        assert_eq!(config.backoff_cap(), Duration::from_millis(30_000));
        assert_eq!(config.max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(config.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
    }
}
