//! WebSocket client transport.
//!
//! Each opened session spawns a tokio task that owns the socket and
//! handles:
//!
//! - Incoming text frames (forwarded as [`TransportEvent::Message`])
//! - Incoming binary frames holding UTF-8 (forwarded as text)
//! - Outgoing frames and close requests from the session handle
//! - Protocol-level ping replies (answered by tungstenite)
//!
//! The task always ends by emitting exactly one [`TransportEvent::Closed`].

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::Result;
use crate::protocol::{CloseCode, CloseReason};

use super::{OpenedSession, Transport, TransportEvent, TransportSession};

// ============================================================================
// Types
// ============================================================================

/// Client WebSocket stream, plain or TLS.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the stream.
type WsSink = SplitSink<WsStream, Message>;

/// Close code reported when the server sent a close without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

// ============================================================================
// SessionCommand
// ============================================================================

/// Internal commands for the session task.
enum SessionCommand {
    /// Write a text frame.
    Send(String),
    /// Send a close frame and stop.
    Close(CloseReason),
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Opens client WebSocket connections with tokio-tungstenite.
///
/// `wss` URLs use rustls with the webpki root store. Connect timeouts are
/// applied by the supervisor.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<OpenedSession> {
        // Never log the full URL: the query carries the credential
        let host = url.host_str().unwrap_or_default().to_string();
        debug!(%host, path = url.path(), "Opening WebSocket");

        let (ws_stream, response) = connect_async(url.as_str()).await?;

        info!(%host, status = response.status().as_u16(), "WebSocket connection established");

        Ok(WebSocketSession::spawn(ws_stream))
    }
}

// ============================================================================
// WebSocketSession
// ============================================================================

/// Handle to one open WebSocket.
///
/// Dropping the handle closes the socket.
pub struct WebSocketSession {
    /// Channel for sending commands to the session task.
    command_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl WebSocketSession {
    /// Spawns the session task for an established stream.
    fn spawn(ws_stream: WsStream) -> OpenedSession {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_event_loop(ws_stream, command_rx, events_tx));

        OpenedSession {
            session: Box::new(Self { command_tx }),
            events: events_rx,
        }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let reason = loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Text frame received");
                            let _ = events_tx.send(TransportEvent::Message(text.as_str().to_owned()));
                        }

                        Some(Ok(Message::Binary(data))) => {
                            match String::from_utf8(data.to_vec()) {
                                Ok(text) => {
                                    let _ = events_tx.send(TransportEvent::Message(text));
                                }
                                Err(_) => warn!(len = data.len(), "Dropping non-UTF-8 binary frame"),
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!("WebSocket closed by remote");
                            break Self::close_reason(frame);
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                            break CloseReason::abnormal(e.to_string());
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break CloseReason::abnormal("stream ended");
                        }

                        // Ping replies are queued by tungstenite itself
                        _ => {}
                    }
                }

                // Commands from the session handle
                command = command_rx.recv() => {
                    match command {
                        Some(SessionCommand::Send(frame)) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                warn!(error = %e, "Failed to write frame");
                                let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                                break CloseReason::abnormal(e.to_string());
                            }
                        }

                        Some(SessionCommand::Close(reason)) => {
                            debug!(code = %reason.code, "Closing WebSocket");
                            Self::send_close(&mut ws_write, &reason).await;
                            break reason;
                        }

                        None => {
                            debug!("Session handle dropped");
                            let reason = CloseReason::normal();
                            Self::send_close(&mut ws_write, &reason).await;
                            break reason;
                        }
                    }
                }
            }
        };

        let _ = events_tx.send(TransportEvent::Closed(reason));
        debug!("Session task terminated");
    }

    /// Writes a close frame, ignoring failures on an already dead socket.
    async fn send_close(ws_write: &mut WsSink, reason: &CloseReason) {
        let frame = CloseFrame {
            code: WsCloseCode::from(reason.code.as_u16()),
            reason: reason.reason.clone().into(),
        };
        if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
            trace!(error = %e, "Close frame not sent");
        }
    }

    /// Maps a received close frame.
    fn close_reason(frame: Option<CloseFrame>) -> CloseReason {
        match frame {
            Some(frame) => CloseReason::new(
                CloseCode::from_u16(u16::from(frame.code)),
                frame.reason.as_str(),
            ),
            None => CloseReason::new(
                CloseCode::from_u16(NO_STATUS_RECEIVED),
                "server closed connection",
            ),
        }
    }
}

impl TransportSession for WebSocketSession {
    fn send(&self, frame: String) -> bool {
        self.command_tx.send(SessionCommand::Send(frame)).is_ok()
    }

    fn force_close(&self, reason: CloseReason) {
        let _ = self.command_tx.send(SessionCommand::Close(reason));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_from_frame() {
        let frame = CloseFrame {
            code: WsCloseCode::from(4000),
            reason: "pong timeout".into(),
        };
        let reason = WebSocketSession::close_reason(Some(frame));
        assert_eq!(reason.code, CloseCode::LivenessFailure);
        assert_eq!(reason.reason, "pong timeout");
    }

    #[test]
    fn test_close_reason_without_frame() {
        let reason = WebSocketSession::close_reason(None);
        assert_eq!(reason.code, CloseCode::Other(1005));
    }

    #[tokio::test]
    async fn test_open_refused_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/s1")).unwrap();
        let err = WebSocketTransport::new().open(&url).await.unwrap_err();
        assert!(err.is_connection_error());
    }
}
