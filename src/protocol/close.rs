//! Close codes and reasons.
//!
//! | Code | Meaning |
//! |------|---------|
//! | 1000 | Normal closure, used for intentional close |
//! | 1001 | Going away |
//! | 1006 | Abnormal: dropped connection or failed open |
//! | 4000 | Liveness failure: pong timeout exceeded |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// CloseCode
// ============================================================================

/// WebSocket-style close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000.
    Normal,
    /// 1001.
    GoingAway,
    /// 1006.
    Abnormal,
    /// 4000, application-defined.
    LivenessFailure,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::Abnormal => 1006,
            Self::LivenessFailure => 4000,
            Self::Other(code) => code,
        }
    }

    /// Maps a numeric code.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1006 => Self::Abnormal,
            4000 => Self::LivenessFailure,
            other => Self::Other(other),
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

// ============================================================================
// CloseReason
// ============================================================================

/// Why a transport session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close code.
    pub code: CloseCode,
    /// Human-readable description.
    pub reason: String,
}

impl CloseReason {
    /// Creates a reason with the given code and text.
    #[inline]
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Caller-initiated close.
    #[inline]
    #[must_use]
    pub fn normal() -> Self {
        Self::new(CloseCode::Normal, "client closed")
    }

    /// Pong timeout exceeded.
    #[inline]
    #[must_use]
    pub fn liveness_failure() -> Self {
        Self::new(CloseCode::LivenessFailure, "pong timeout")
    }

    /// Connection dropped or never opened.
    #[inline]
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CloseCode::Abnormal, reason)
    }

    /// Returns `true` for normal closure.
    #[inline]
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == CloseCode::Normal
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "{} (code {})", self.reason, self.code)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_conversion() {
        assert_eq!(CloseCode::Normal.as_u16(), 1000);
        assert_eq!(CloseCode::LivenessFailure.as_u16(), 4000);
        assert_eq!(CloseCode::from_u16(1006), CloseCode::Abnormal);
        assert_eq!(CloseCode::from(4000), CloseCode::LivenessFailure);
        assert_eq!(CloseCode::from_u16(4001), CloseCode::Other(4001));
        assert_eq!(CloseCode::Other(4001).as_u16(), 4001);
    }

    #[test]
    fn test_close_reason_constructors() {
        assert!(CloseReason::normal().is_normal());
        assert_eq!(CloseReason::liveness_failure().code.as_u16(), 4000);
        assert_eq!(CloseReason::abnormal("reset").code, CloseCode::Abnormal);
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(
            CloseReason::liveness_failure().to_string(),
            "pong timeout (code 4000)"
        );
        assert_eq!(
            CloseReason::new(CloseCode::GoingAway, "").to_string(),
            "code 1001"
        );
    }
}
