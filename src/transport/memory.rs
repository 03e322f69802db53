//! In-process transport.
//!
//! [`MemoryTransport`] hands out connections whose far end is a
//! [`MemoryPeer`] living in the same process. Open attempts can be scripted
//! to fail, and each peer can push frames, refuse handoffs and close its
//! side, which makes every reconnect path reproducible under paused time.
//!
//! # Example
//!
//! ```ignore
//! let (transport, mut peers) = MemoryTransport::new();
//! transport.refuse_next(2);
//!
//! // ...start a supervisor on `transport`...
//!
//! let peer = peers.next().await.unwrap();
//! peer.push_text(r#"{"type":"pong"}"#);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::CloseReason;

use super::{OpenedSession, Transport, TransportEvent, TransportSession};

// ============================================================================
// OpenBehavior
// ============================================================================

/// Scripted outcome of one open attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Open succeeds.
    Accept,
    /// Open fails with a connection error carrying this message.
    Refuse(String),
}

// ============================================================================
// OpenAttempt
// ============================================================================

/// Record of one call to [`Transport::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAttempt {
    /// URL the attempt targeted.
    pub url: Url,
    /// When the attempt was made.
    pub at: Instant,
    /// Whether the attempt succeeded.
    pub accepted: bool,
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Shared state of a [`MemoryTransport`].
struct TransportInner {
    script: Mutex<VecDeque<OpenBehavior>>,
    attempts: Mutex<Vec<OpenAttempt>>,
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
}

/// Transport whose connections stay inside the process.
///
/// Cloning shares the script and attempt log.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<TransportInner>,
}

impl MemoryTransport {
    /// Creates the transport and the stream of peers it opens.
    #[must_use]
    pub fn new() -> (Self, MemoryPeers) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(TransportInner {
                script: Mutex::new(VecDeque::new()),
                attempts: Mutex::new(Vec::new()),
                peers_tx,
            }),
        };
        (transport, MemoryPeers { rx: peers_rx })
    }

    /// Appends outcomes for upcoming attempts. Unscripted attempts succeed.
    pub fn script(&self, behaviors: impl IntoIterator<Item = OpenBehavior>) {
        self.inner.script.lock().extend(behaviors);
    }

    /// Makes the next `count` attempts fail.
    pub fn refuse_next(&self, count: usize) {
        self.script((0..count).map(|_| OpenBehavior::Refuse("connection refused".to_string())));
    }

    /// Every attempt so far, oldest first.
    #[must_use]
    pub fn attempts(&self) -> Vec<OpenAttempt> {
        self.inner.attempts.lock().clone()
    }

    /// Number of attempts so far.
    #[inline]
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.inner.attempts.lock().len()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("scripted", &self.inner.script.lock().len())
            .field("attempts", &self.attempt_count())
            .finish()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &Url) -> Result<OpenedSession> {
        let behavior = self
            .inner
            .script
            .lock()
            .pop_front()
            .unwrap_or(OpenBehavior::Accept);

        let accepted = behavior == OpenBehavior::Accept;
        self.inner.attempts.lock().push(OpenAttempt {
            url: url.clone(),
            at: Instant::now(),
            accepted,
        });

        if let OpenBehavior::Refuse(message) = behavior {
            debug!(%message, "Memory open refused");
            return Err(Error::connection(message));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = Arc::new(PeerLink {
            sent: Mutex::new(Vec::new()),
            accepting: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            client_close: Mutex::new(None),
            events_tx,
        });

        let peer = MemoryPeer {
            link: Arc::clone(&link),
            url: url.clone(),
        };
        let _ = self.inner.peers_tx.send(peer);

        Ok(OpenedSession {
            session: Box::new(MemorySession { link }),
            events: events_rx,
        })
    }
}

// ============================================================================
// PeerLink
// ============================================================================

/// State shared by both ends of one connection.
struct PeerLink {
    sent: Mutex<Vec<String>>,
    accepting: AtomicBool,
    closed: AtomicBool,
    client_close: Mutex<Option<CloseReason>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl PeerLink {
    /// Marks the link closed and emits `Closed` once.
    fn close(&self, reason: CloseReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.events_tx.send(TransportEvent::Closed(reason));
        true
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// MemorySession
// ============================================================================

/// Client end of an in-process connection.
struct MemorySession {
    link: Arc<PeerLink>,
}

impl TransportSession for MemorySession {
    fn send(&self, frame: String) -> bool {
        if self.link.is_closed() || !self.link.accepting.load(Ordering::Acquire) {
            return false;
        }
        self.link.sent.lock().push(frame);
        true
    }

    fn force_close(&self, reason: CloseReason) {
        *self.link.client_close.lock() = Some(reason.clone());
        self.link.close(reason);
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Server end of an in-process connection.
#[derive(Clone)]
pub struct MemoryPeer {
    link: Arc<PeerLink>,
    url: Url,
}

impl MemoryPeer {
    /// URL the client connected to.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Delivers a text frame to the client. Returns `false` once closed.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        if self.link.is_closed() {
            return false;
        }
        self.link
            .events_tx
            .send(TransportEvent::Message(text.into()))
            .is_ok()
    }

    /// Delivers a JSON value as a text frame.
    pub fn push_json(&self, value: &Value) -> bool {
        self.push_text(value.to_string())
    }

    /// Replies to a heartbeat.
    pub fn pong(&self) -> bool {
        self.push_text(r#"{"type":"pong"}"#)
    }

    /// Reports a transport error without closing.
    pub fn push_error(&self, message: impl Into<String>) -> bool {
        self.link
            .events_tx
            .send(TransportEvent::Error(message.into()))
            .is_ok()
    }

    /// Closes from the server side. Returns `false` if already closed.
    pub fn close(&self, reason: CloseReason) -> bool {
        self.link.close(reason)
    }

    /// Controls whether the client's handoffs are accepted.
    pub fn set_accepting(&self, accepting: bool) {
        self.link.accepting.store(accepting, Ordering::Release);
    }

    /// Frames the client has handed off, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.link.sent.lock().clone()
    }

    /// Handed-off frames parsed as JSON. Unparseable frames are skipped.
    #[must_use]
    pub fn sent_json(&self) -> Vec<Value> {
        self.link
            .sent
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Reason given if the client closed this connection.
    #[must_use]
    pub fn client_close(&self) -> Option<CloseReason> {
        self.link.client_close.lock().clone()
    }

    /// Returns `true` once either side has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.link.is_closed()
    }
}

impl std::fmt::Debug for MemoryPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPeer")
            .field("url", &self.url.path())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// MemoryPeers
// ============================================================================

/// Stream of peers, one per successful open.
#[derive(Debug)]
pub struct MemoryPeers {
    rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryPeers {
    /// Waits for the next opened connection.
    pub async fn next(&mut self) -> Option<MemoryPeer> {
        self.rx.recv().await
    }

    /// Returns an already opened connection, if any.
    pub fn try_next(&mut self) -> Option<MemoryPeer> {
        self.rx.try_recv().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
