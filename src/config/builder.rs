//! Builder pattern for connection configuration.
//!
//! Provides a fluent API for creating validated [`ConnectionConfig`] values.
//!
//! # Example
//!
//! ```no_run
//! use chat_link::ConnectionConfig;
//!
//! # fn example() -> chat_link::Result<()> {
//! let config = ConnectionConfig::builder()
//!     .endpoint("wss://chat.example.com/ws")
//!     .session_id("conv-42")
//!     .credential("secret-token")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::options::{
    ConnectionConfig, Credential, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_FRAME_LEN,
    DEFAULT_MAX_RETRIES, DEFAULT_PONG_TIMEOUT, DEFAULT_QUEUE_CAPACITY,
};

// ============================================================================
// ConnectionConfigBuilder
// ============================================================================

/// Builder for a [`ConnectionConfig`].
///
/// Use [`ConnectionConfig::builder()`] to create a new builder.
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    host: Option<String>,
    path: String,
    secure: bool,
    session_id: Option<String>,
    credential: Option<Credential>,
    max_retries: u32,
    heartbeat_interval: Duration,
    pong_timeout: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
    connect_timeout: Duration,
    queue_capacity: usize,
    max_frame_len: usize,
    /// Deferred `endpoint()` parse failure, reported by `build()`.
    endpoint_error: Option<String>,
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self {
            host: None,
            path: String::new(),
            secure: true,
            session_id: None,
            credential: None,
            max_retries: DEFAULT_MAX_RETRIES,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            endpoint_error: None,
        }
    }
}

// ============================================================================
// ConnectionConfigBuilder Implementation
// ============================================================================

impl ConnectionConfigBuilder {
    /// Creates a new builder with default timings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets host, path and scheme from a base URL.
    ///
    /// Accepts `ws`, `wss`, `http` and `https`; `https`/`wss` select the
    /// secure scheme, mirroring a page served over TLS.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Base URL such as `wss://chat.example.com/ws`
    #[must_use]
    pub fn endpoint(mut self, endpoint: &str) -> Self {
        match Url::parse(endpoint) {
            Ok(url) => {
                let secure = match url.scheme() {
                    "wss" | "https" => true,
                    "ws" | "http" => false,
                    other => {
                        self.endpoint_error = Some(format!("Unsupported scheme: {other}"));
                        return self;
                    }
                };

                let Some(host) = url.host_str() else {
                    self.endpoint_error = Some(format!("Endpoint has no host: {endpoint}"));
                    return self;
                };

                self.host = Some(match url.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                });
                self.path = url.path().to_string();
                self.secure = secure;
                self.endpoint_error = None;
            }
            Err(e) => {
                self.endpoint_error = Some(format!("Invalid endpoint {endpoint}: {e}"));
            }
        }
        self
    }

    /// Sets the server host (optionally `host:port`).
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the path prefix placed before the session id.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Selects `wss` (`true`, default) or `ws` (`false`).
    #[inline]
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the session / conversation identifier.
    #[inline]
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the auth credential.
    #[inline]
    #[must_use]
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(Credential::new(credential));
        self
    }

    /// Sets the reconnect attempts allowed before a fatal error.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the heartbeat ping interval.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets how long a ping may stay unanswered.
    #[inline]
    #[must_use]
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    /// Sets the base and cap of the exponential backoff.
    #[inline]
    #[must_use]
    pub fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    /// Sets the time allowed for one transport open.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets how many messages may wait in the outbound queue.
    #[inline]
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the largest inbound frame accepted, in bytes.
    #[inline]
    #[must_use]
    pub fn max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if host, session id or credential is missing
    /// - [`Error::Config`] if a duration or capacity is zero
    /// - [`Error::Config`] if the backoff cap is below the base
    /// - [`Error::InvalidUrl`] if the resulting URL is malformed
    pub fn build(self) -> Result<ConnectionConfig> {
        if let Some(message) = self.endpoint_error {
            return Err(Error::config(message));
        }

        let host = self.host.filter(|h| !h.is_empty()).ok_or_else(|| {
            Error::config(
                "Host is required. Use .host() or .endpoint() to set it.\n\
                 Example: ConnectionConfig::builder().endpoint(\"wss://chat.example.com/ws\")",
            )
        })?;

        let session_id = self
            .session_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::config("Session id is required. Use .session_id() to set it."))?;

        let credential = self
            .credential
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::config("Credential is required. Use .credential() to set it."))?;

        Self::require_nonzero("heartbeat_interval", self.heartbeat_interval)?;
        Self::require_nonzero("pong_timeout", self.pong_timeout)?;
        Self::require_nonzero("backoff base", self.backoff_base)?;
        Self::require_nonzero("connect_timeout", self.connect_timeout)?;

        if self.backoff_cap < self.backoff_base {
            return Err(Error::config(format!(
                "Backoff cap ({}ms) must not be below base ({}ms)",
                self.backoff_cap.as_millis(),
                self.backoff_base.as_millis()
            )));
        }

        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be at least 1"));
        }

        if self.max_frame_len == 0 {
            return Err(Error::config("max_frame_len must be at least 1"));
        }

        let config = ConnectionConfig {
            host,
            path: self.path,
            secure: self.secure,
            session_id,
            credential,
            max_retries: self.max_retries,
            heartbeat_interval: self.heartbeat_interval,
            pong_timeout: self.pong_timeout,
            backoff_base: self.backoff_base,
            backoff_cap: self.backoff_cap,
            connect_timeout: self.connect_timeout,
            queue_capacity: self.queue_capacity,
            max_frame_len: self.max_frame_len,
        };

        // Surface URL problems now rather than on first connect
        config.connection_url()?;

        Ok(config)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionConfigBuilder {
    fn require_nonzero(name: &str, value: Duration) -> Result<()> {
        if value.is_zero() {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
            .host("chat.example.com")
            .session_id("conv-1")
            .credential("token")
    }

    #[test]
    fn test_new_uses_defaults() {
        let builder = ConnectionConfigBuilder::new();
        assert!(builder.host.is_none());
        assert!(builder.secure);
        assert_eq!(builder.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn test_build_complete() {
        let config = complete().max_retries(3).build().expect("valid");
        assert_eq!(config.host(), "chat.example.com");
        assert_eq!(config.max_retries(), 3);
    }

    #[test]
    fn test_endpoint_parses_scheme_host_and_path() {
        let config = ConnectionConfigBuilder::new()
            .endpoint("http://localhost:8000/ws/chat")
            .session_id("c")
            .credential("t")
            .build()
            .expect("valid");

        assert_eq!(config.host(), "localhost:8000");
        assert_eq!(config.path(), "/ws/chat");
        assert!(!config.is_secure());
    }

    #[test]
    fn test_https_endpoint_is_secure() {
        let config = ConnectionConfigBuilder::new()
            .endpoint("https://chat.example.com")
            .session_id("c")
            .credential("t")
            .build()
            .expect("valid");

        assert!(config.is_secure());
    }

    #[test]
    fn test_endpoint_rejects_unknown_scheme() {
        let err = ConnectionConfigBuilder::new()
            .endpoint("ftp://chat.example.com")
            .session_id("c")
            .credential("t")
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("Unsupported scheme"));
    }

    #[test]
    fn test_build_fails_without_host() {
        let err = ConnectionConfigBuilder::new()
            .session_id("c")
            .credential("t")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Host"));
    }

    #[test]
    fn test_build_fails_without_session_id() {
        let err = ConnectionConfigBuilder::new()
            .host("h")
            .credential("t")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Session id"));
    }

    #[test]
    fn test_build_fails_without_credential() {
        let err = ConnectionConfigBuilder::new()
            .host("h")
            .session_id("c")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Credential"));
    }

    #[test]
    fn test_build_rejects_zero_heartbeat() {
        let result = complete().heartbeat_interval(Duration::ZERO).build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_rejects_cap_below_base() {
        let result = complete()
            .backoff(Duration::from_secs(5), Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_zero_queue_capacity() {
        assert!(complete().queue_capacity(0).build().is_err());
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = complete();
        let cloned = builder.clone();
        assert_eq!(builder.host, cloned.host);
    }
}
