//! Connection state, heartbeat bookkeeping and reconnect backoff.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the supervised connection.
///
/// ```text
/// Disconnected ──connect()──► Connecting ──opened──► Open
///      ▲                          │                   │
///      └──────── failure ─────────┴───── drop ────────┘
///      └──────────────────── close() ◄── Closing ◄────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session and none in progress.
    #[default]
    Disconnected,
    /// A session open is in progress.
    Connecting,
    /// A session is open and heartbeating.
    Open,
    /// An intentional close is tearing the session down.
    Closing,
}

impl ConnectionState {
    /// Returns `true` while a session is open or opening.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Returns `true` when a session is open.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ============================================================================
// HeartbeatState
// ============================================================================

/// Ping/pong timestamps for the current session.
///
/// `unanswered_since` is the send time of the oldest ping not yet followed
/// by a pong. Later pings do not move it, so a silent peer is detected even
/// though pings keep going out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatState {
    /// When the last ping was handed off.
    pub last_ping_sent_at: Option<Instant>,
    /// When the last pong arrived.
    pub last_pong_received_at: Option<Instant>,
    /// Oldest unanswered ping.
    pub unanswered_since: Option<Instant>,
}

impl HeartbeatState {
    /// Clears all timestamps for a new session.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records a ping sent at `now`; the previous pong no longer counts.
    #[inline]
    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping_sent_at = Some(now);
        self.last_pong_received_at = None;
        self.unanswered_since.get_or_insert(now);
    }

    /// Records a pong received at `now`.
    #[inline]
    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong_received_at = Some(now);
        self.unanswered_since = None;
    }

    /// Returns `true` if a ping has gone unanswered for at least `timeout`.
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.unanswered_since
            .is_some_and(|since| now.saturating_duration_since(since) >= timeout)
    }

    /// Returns `true` while a ping is waiting for its pong.
    #[inline]
    #[must_use]
    pub const fn awaiting_pong(&self) -> bool {
        self.unanswered_since.is_some()
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff: `min(base * 2^attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
}

impl Backoff {
    /// Creates a backoff curve.
    #[inline]
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the reconnect following `attempt` earlier ones.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap)
    }
}

// ============================================================================
// ReconnectState
// ============================================================================

/// Retry budget and next delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    attempt_count: u32,
    next_delay: Duration,
    backoff: Backoff,
}

impl ReconnectState {
    /// Creates a fresh budget.
    #[must_use]
    pub fn new(backoff: Backoff) -> Self {
        Self {
            attempt_count: 0,
            next_delay: backoff.delay_for(0),
            backoff,
        }
    }

    /// Restores the full budget after a successful open.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.next_delay = self.backoff.delay_for(0);
    }

    /// Claims the next attempt.
    ///
    /// Returns the delay to wait, or `None` once `max_retries` attempts have
    /// been claimed since the last reset.
    pub fn next_attempt(&mut self, max_retries: u32) -> Option<Duration> {
        if self.is_exhausted(max_retries) {
            return None;
        }
        let delay = self.next_delay;
        self.attempt_count += 1;
        self.next_delay = self.backoff.delay_for(self.attempt_count);
        Some(delay)
    }

    /// Attempts claimed since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Delay the next claimed attempt will use.
    #[inline]
    #[must_use]
    pub const fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Returns `true` when no attempts remain.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self, max_retries: u32) -> bool {
        self.attempt_count >= max_retries
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut state = ReconnectState::new(Backoff::new(ms(1000), ms(30_000)));
        let delays: Vec<u64> = (0..6)
            .map(|_| state.next_attempt(10).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000, 30_000]);
        assert_eq!(state.attempt_count(), 6);
    }

    #[test]
    fn test_budget_exhausts() {
        let mut state = ReconnectState::new(Backoff::new(ms(10), ms(100)));
        for _ in 0..3 {
            assert!(state.next_attempt(3).is_some());
        }
        assert!(state.next_attempt(3).is_none());
        assert!(state.is_exhausted(3));
        assert_eq!(state.attempt_count(), 3);
    }

    #[test]
    fn test_zero_retries_never_schedules() {
        let mut state = ReconnectState::new(Backoff::new(ms(10), ms(100)));
        assert!(state.next_attempt(0).is_none());
    }

    #[test]
    fn test_reset_restores_base_delay() {
        let mut state = ReconnectState::new(Backoff::new(ms(1000), ms(30_000)));
        state.next_attempt(10);
        state.next_attempt(10);
        assert_eq!(state.next_delay(), ms(4000));

        state.reset();
        assert_eq!(state.attempt_count(), 0);
        assert_eq!(state.next_attempt(10), Some(ms(1000)));
    }

    #[test]
    fn test_backoff_saturates_for_large_attempts() {
        let backoff = Backoff::new(ms(1000), ms(30_000));
        assert_eq!(backoff.delay_for(200), ms(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_tracks_oldest_unanswered_ping() {
        let mut hb = HeartbeatState::default();
        let t0 = Instant::now();
        let timeout = Duration::from_secs(600);

        hb.record_ping(t0);
        hb.record_ping(t0 + Duration::from_secs(30));
        assert_eq!(hb.unanswered_since, Some(t0));
        assert_eq!(hb.last_ping_sent_at, Some(t0 + Duration::from_secs(30)));

        assert!(!hb.is_expired(t0 + Duration::from_secs(599), timeout));
        assert!(hb.is_expired(t0 + timeout, timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_clears_unanswered() {
        let mut hb = HeartbeatState::default();
        let t0 = Instant::now();

        hb.record_ping(t0);
        hb.record_pong(t0 + Duration::from_secs(1));
        assert!(!hb.awaiting_pong());
        assert_eq!(hb.last_pong_received_at, Some(t0 + Duration::from_secs(1)));
        assert!(!hb.is_expired(t0 + Duration::from_secs(10_000), Duration::from_secs(600)));

        hb.record_ping(t0 + Duration::from_secs(30));
        assert_eq!(hb.last_pong_received_at, None);
        assert_eq!(hb.unanswered_since, Some(t0 + Duration::from_secs(30)));

        hb.reset();
        assert_eq!(hb, HeartbeatState::default());
    }

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Open.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Closing.is_active());
        assert!(!ConnectionState::Disconnected.is_open());
        assert_eq!(ConnectionState::Open.to_string(), "open");
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(
            base in 1u64..5_000,
            extra in 0u64..120_000,
            attempt in 0u32..64,
        ) {
            let backoff = Backoff::new(ms(base), ms(base + extra));
            let current = backoff.delay_for(attempt);
            let next = backoff.delay_for(attempt + 1);
            prop_assert!(current <= next);
            prop_assert!(next <= ms(base + extra));
            prop_assert!(current >= ms(base));
        }
    }
}
