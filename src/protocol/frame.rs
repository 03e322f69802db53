//! Wire frames.
//!
//! All frames are JSON text. The core only looks at the top-level `type`
//! field to spot heartbeat replies; everything else is opaque.
//!
//! | Frame | Direction | Shape |
//! |-------|-----------|-------|
//! | Ping | Local → Remote | `{"type":"ping"}` |
//! | Pong | Remote → Local | `{"type":"pong"}` (swallowed) |
//! | Envelope | Local → Remote | `{"client_message_id":"<uuid>","payload":…}` |
//! | Application | Remote → Local | any other JSON value |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, to_string};

use crate::error::{Error, Result};
use crate::identifiers::ClientMessageId;

// ============================================================================
// ControlFrame
// ============================================================================

/// Heartbeat control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Liveness probe sent by the client.
    Ping,
    /// Server reply to a ping.
    Pong,
}

impl ControlFrame {
    /// Encodes the frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(self) -> Result<String> {
        Ok(to_string(&self)?)
    }
}

// ============================================================================
// OutboundEnvelope
// ============================================================================

/// Application frame carrying one caller payload.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope<'a> {
    /// Id the receiver uses for duplicate suppression.
    pub client_message_id: ClientMessageId,
    /// Opaque caller payload.
    pub payload: &'a Value,
}

impl<'a> OutboundEnvelope<'a> {
    /// Creates an envelope borrowing the payload.
    #[inline]
    #[must_use]
    pub const fn new(client_message_id: ClientMessageId, payload: &'a Value) -> Self {
        Self {
            client_message_id,
            payload,
        }
    }

    /// Encodes the envelope as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Heartbeat reply; never surfaced to subscribers.
    Pong,
    /// Anything else, forwarded verbatim.
    Application(Value),
}

impl InboundFrame {
    /// Parses and classifies one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::FrameTooLarge`] if `text` exceeds `max_len` bytes
    /// - [`Error::Json`] if `text` is not valid JSON
    pub fn parse(text: &str, max_len: usize) -> Result<Self> {
        if text.len() > max_len {
            return Err(Error::frame_too_large(text.len(), max_len));
        }

        let value: Value = from_str(text)?;

        if value.get("type").and_then(Value::as_str) == Some("pong") {
            return Ok(Self::Pong);
        }

        Ok(Self::Application(value))
    }

    /// Returns `true` for heartbeat replies.
    #[inline]
    #[must_use]
    pub fn is_pong(&self) -> bool {
        matches!(self, Self::Pong)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    const MAX: usize = 1024;

    #[test]
    fn test_ping_encoding() {
        assert_eq!(ControlFrame::Ping.encode().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_pong_is_classified() {
        let frame = InboundFrame::parse(r#"{"type":"pong"}"#, MAX).unwrap();
        assert!(frame.is_pong());
    }

    #[test]
    fn test_pong_with_extra_fields_is_still_pong() {
        let frame = InboundFrame::parse(r#"{"type":"pong","ts":17}"#, MAX).unwrap();
        assert_eq!(frame, InboundFrame::Pong);
    }

    #[test]
    fn test_application_frame_passes_through() {
        let text = r#"{"message_type":"result_batch","rows":[1,2]}"#;
        let frame = InboundFrame::parse(text, MAX).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Application(json!({ "message_type": "result_batch", "rows": [1, 2] }))
        );
    }

    #[test]
    fn test_non_object_frame_is_application() {
        let frame = InboundFrame::parse("[1,2,3]", MAX).unwrap();
        assert_eq!(frame, InboundFrame::Application(json!([1, 2, 3])));
    }

    #[test]
    fn test_type_ping_is_not_swallowed() {
        let frame = InboundFrame::parse(r#"{"type":"ping"}"#, MAX).unwrap();
        assert!(!frame.is_pong());
    }

    #[test]
    fn test_malformed_frame_is_error() {
        let err = InboundFrame::parse("{not json", MAX).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_oversized_frame_is_error() {
        let text = format!(r#"{{"pad":"{}"}}"#, "x".repeat(64));
        let err = InboundFrame::parse(&text, 16).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_envelope_encoding() {
        let id = ClientMessageId::generate();
        let payload = json!({ "text": "hi" });
        let encoded = OutboundEnvelope::new(id, &payload).encode().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(value["client_message_id"], json!(id.to_string()));
        assert_eq!(value["payload"], payload);
    }
}
