//! Timer facility.
//!
//! Schedules one-shot and repeating timers whose fires are delivered as
//! messages on a channel, so the owner handles them on its own task next
//! to every other event. Nothing here ever blocks the owner.
//!
//! # Cancellation
//!
//! Each timer is keyed; scheduling a key again replaces the previous timer.
//! Cancelling aborts the sleeping task, but a fire already sitting in the
//! channel cannot be recalled. Every fire therefore carries a
//! [`TimerToken`] and the owner checks it with [`Timers::accept`] before
//! acting on it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::trace;

// ============================================================================
// Types
// ============================================================================

/// Identity of one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Message delivered when a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired<K> {
    /// Timer key.
    pub key: K,
    /// Token of the timer that fired.
    pub token: TimerToken,
}

/// Bookkeeping for a live timer.
struct LiveTimer {
    token: TimerToken,
    repeating: bool,
    handle: JoinHandle<()>,
}

// ============================================================================
// Timers
// ============================================================================

/// Keyed set of cancellable timers.
///
/// Must be used from within a tokio runtime.
pub struct Timers<K> {
    tx: mpsc::UnboundedSender<TimerFired<K>>,
    live: FxHashMap<K, LiveTimer>,
    next_token: u64,
}

impl<K> Timers<K>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
{
    /// Creates the facility and the receiver its fires arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired<K>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = Self {
            tx,
            live: FxHashMap::default(),
            next_token: 0,
        };
        (timers, rx)
    }

    /// Fires `key` once after `delay`, replacing any timer with that key.
    pub fn schedule_once(&mut self, key: K, delay: Duration) -> TimerToken {
        let token = self.allocate_token();
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(TimerFired { key, token });
        });

        trace!(?key, delay_ms = delay.as_millis() as u64, "One-shot timer scheduled");
        self.install(key, token, false, handle);
        token
    }

    /// Fires `key` every `period`, first after one full period.
    pub fn schedule_repeating(&mut self, key: K, period: Duration) -> TimerToken {
        let token = self.allocate_token();
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(TimerFired { key, token }).is_err() {
                    break;
                }
            }
        });

        trace!(?key, period_ms = period.as_millis() as u64, "Repeating timer scheduled");
        self.install(key, token, true, handle);
        token
    }

    /// Cancels the timer for `key`. Returns `true` if one was live.
    pub fn cancel(&mut self, key: K) -> bool {
        match self.live.remove(&key) {
            Some(timer) => {
                timer.handle.abort();
                trace!(?key, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels every timer. Returns how many were live.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.live.len();
        for (_, timer) in self.live.drain() {
            timer.handle.abort();
        }
        count
    }

    /// Checks a fire against the live set.
    ///
    /// Returns `false` for fires of cancelled or replaced timers. A
    /// one-shot timer is retired when its fire is accepted.
    pub fn accept(&mut self, fired: &TimerFired<K>) -> bool {
        let Some(timer) = self.live.get(&fired.key) else {
            return false;
        };

        if timer.token != fired.token {
            return false;
        }

        if !timer.repeating {
            self.live.remove(&fired.key);
        }

        true
    }

    /// Returns `true` if a timer for `key` is live.
    #[inline]
    #[must_use]
    pub fn is_scheduled(&self, key: K) -> bool {
        self.live.contains_key(&key)
    }

    /// Number of live timers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if no timer is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn allocate_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }

    fn install(&mut self, key: K, token: TimerToken, repeating: bool, handle: JoinHandle<()>) {
        let timer = LiveTimer {
            token,
            repeating,
            handle,
        };
        if let Some(previous) = self.live.insert(key, timer) {
            previous.handle.abort();
        }
    }
}

impl<K> Drop for Timers<K> {
    fn drop(&mut self) {
        for (_, timer) in self.live.drain() {
            timer.handle.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::timeout;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Key {
        A,
        B,
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_after_delay() {
        let (mut timers, mut rx) = Timers::new();
        let start = Instant::now();
        timers.schedule_once(Key::A, Duration::from_millis(1500));

        let fired = rx.recv().await.expect("fire");
        assert_eq!(fired.key, Key::A);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert!(timers.accept(&fired));
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_fires_each_period() {
        let (mut timers, mut rx) = Timers::new();
        let start = Instant::now();
        timers.schedule_repeating(Key::A, Duration::from_secs(30));

        for n in 1..=3u32 {
            let fired = rx.recv().await.expect("tick");
            assert!(timers.accept(&fired));
            assert_eq!(start.elapsed(), Duration::from_secs(30) * n);
        }
        assert!(timers.is_scheduled(Key::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (mut timers, mut rx) = Timers::new();
        timers.schedule_once(Key::A, Duration::from_secs(1));
        assert!(timers.cancel(Key::A));
        assert!(!timers.cancel(Key::A));

        let result = timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(result.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replaced_timer_fire_is_rejected() {
        let (mut timers, mut rx) = Timers::new();
        timers.schedule_once(Key::A, Duration::from_secs(1));

        // Let the first timer's fire land in the channel, then replace it
        let stale = rx.recv().await.expect("fire");
        timers.schedule_once(Key::A, Duration::from_secs(10));

        assert!(!timers.accept(&stale));
        assert!(timers.is_scheduled(Key::A));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_clears_everything() {
        let (mut timers, mut rx) = Timers::new();
        timers.schedule_once(Key::A, Duration::from_secs(1));
        timers.schedule_repeating(Key::B, Duration::from_secs(1));

        assert_eq!(timers.cancel_all(), 2);
        assert!(timers.is_empty());
        assert!(timeout(Duration::from_secs(5), rx.recv()).await.is_err());
    }
}
