//! Supervisor task.
//!
//! One tokio task owns all connection state and processes three mailboxes
//! in a single `select!` loop:
//!
//! | Mailbox | Source | Contents |
//! |---------|--------|----------|
//! | commands | [`Supervisor`](super::Supervisor) handles | connect, send, close |
//! | signals | Per-session pump tasks | open result, frames, close |
//! | timers | [`Timers`] | heartbeat, pong deadline, reconnect |
//!
//! Every signal is tagged with the [`Epoch`] of the session that produced
//! it. Signals from any session other than the current one are dropped, so
//! a late close from a replaced socket can never tear down its successor.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::identifiers::Epoch;
use crate::protocol::{CloseCode, CloseReason, ControlFrame, InboundFrame};
use crate::queue::{OutboundMessage, OutboundQueue, QueueDepth};
use crate::timer::{TimerFired, Timers};
use crate::transport::{OpenedSession, Transport, TransportEvent, TransportSession};

use super::events::{Event, EventEmitter, EventHandlers, SubscriberRegistry};
use super::state::{Backoff, ConnectionState, HeartbeatState, ReconnectState};

// ============================================================================
// Command
// ============================================================================

/// Requests from supervisor handles.
pub(crate) enum Command {
    /// Open a session if none is active.
    Connect,
    /// Queue a message; slot already reserved in [`QueueDepth`].
    Send(OutboundMessage),
    /// Close intentionally.
    Close,
}

// ============================================================================
// Signal
// ============================================================================

/// Report from a session pump, tagged with its epoch.
pub(crate) struct Signal {
    epoch: Epoch,
    kind: SignalKind,
}

pub(crate) enum SignalKind {
    /// The transport opened.
    Opened(Box<dyn TransportSession>),
    /// The transport failed to open.
    OpenFailed(Error),
    /// Something happened on the open transport.
    Transport(TransportEvent),
}

impl Signal {
    #[inline]
    const fn new(epoch: Epoch, kind: SignalKind) -> Self {
        Self { epoch, kind }
    }
}

// ============================================================================
// TimerKind
// ============================================================================

/// Keys of the supervisor's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimerKind {
    /// Repeating ping while open.
    Heartbeat,
    /// One-shot expiry of the oldest unanswered ping.
    PongDeadline,
    /// One-shot delayed reopen.
    Reconnect,
}

// ============================================================================
// SupervisorStats
// ============================================================================

/// Point-in-time view of the supervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Connection state.
    pub state: ConnectionState,
    /// Epoch of the newest session.
    pub epoch: Epoch,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Messages waiting in the queue.
    pub queued: usize,
    /// Timers currently scheduled.
    pub live_timers: usize,
    /// Sessions opened successfully.
    pub sessions_opened: u64,
    /// Whether reconnects are exhausted.
    pub exhausted: bool,
}

// ============================================================================
// Shared
// ============================================================================

/// State readable from handles without a round trip to the task.
pub(crate) struct Shared {
    pub(crate) stats: RwLock<SupervisorStats>,
    pub(crate) depth: QueueDepth,
    pub(crate) subscribers: SubscriberRegistry,
}

impl Shared {
    pub(crate) fn new(queue_capacity: usize) -> Self {
        Self {
            stats: RwLock::new(SupervisorStats::default()),
            depth: QueueDepth::new(queue_capacity),
            subscribers: SubscriberRegistry::default(),
        }
    }
}

// ============================================================================
// SupervisorCore
// ============================================================================

/// State owned by the supervisor task.
pub(crate) struct SupervisorCore {
    config: ConnectionConfig,
    url: Url,
    transport: Arc<dyn Transport>,

    state: ConnectionState,
    epoch: Epoch,
    session: Option<Box<dyn TransportSession>>,
    pump: Option<JoinHandle<()>>,

    queue: OutboundQueue,
    heartbeat: HeartbeatState,
    reconnect: ReconnectState,
    timers: Timers<TimerKind>,

    intentional_close: bool,
    exhausted: bool,
    sessions_opened: u64,

    emitter: EventEmitter,
    shared: Arc<Shared>,
    signal_tx: mpsc::UnboundedSender<Signal>,
}

/// Receivers the task loop selects over, besides commands.
pub(crate) struct Mailboxes {
    signals: mpsc::UnboundedReceiver<Signal>,
    timers: mpsc::UnboundedReceiver<TimerFired<TimerKind>>,
}

impl SupervisorCore {
    /// Creates the task state. Must be called within a tokio runtime.
    pub(crate) fn new(
        config: ConnectionConfig,
        url: Url,
        transport: Arc<dyn Transport>,
        handlers: EventHandlers,
        shared: Arc<Shared>,
    ) -> (Self, Mailboxes) {
        let (signal_tx, signals) = mpsc::unbounded_channel();
        let (timers, timer_rx) = Timers::new();
        let backoff = Backoff::new(config.backoff_base(), config.backoff_cap());
        let emitter = EventEmitter::new(handlers, shared.subscribers.clone());

        let core = Self {
            config,
            url,
            transport,
            state: ConnectionState::Disconnected,
            epoch: Epoch::ZERO,
            session: None,
            pump: None,
            queue: OutboundQueue::new(),
            heartbeat: HeartbeatState::default(),
            reconnect: ReconnectState::new(backoff),
            timers,
            intentional_close: false,
            exhausted: false,
            sessions_opened: 0,
            emitter,
            shared,
            signal_tx,
        };

        let mailboxes = Mailboxes {
            signals,
            timers: timer_rx,
        };

        (core, mailboxes)
    }

    /// Runs until every handle is dropped, then closes.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut mailboxes: Mailboxes,
    ) {
        debug!(host = self.config.host(), "Supervisor started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("All supervisor handles dropped");
                            self.close();
                            self.publish_stats();
                            break;
                        }
                    }
                }

                Some(signal) = mailboxes.signals.recv() => {
                    self.handle_signal(signal);
                }

                Some(fired) = mailboxes.timers.recv() => {
                    self.handle_timer(fired);
                }
            }

            self.publish_stats();
        }

        self.shared.subscribers.close_all();
        debug!("Supervisor terminated");
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Send(message) => {
                trace!(id = %message.client_message_id, queued = self.queue.len() + 1, "Message queued");
                self.queue.enqueue(message);
                if self.state.is_open() {
                    self.drain_queue();
                }
            }
            Command::Close => self.close(),
        }
    }

    /// Starts a session unless one is active.
    fn connect(&mut self) {
        if self.state.is_active() {
            debug!(state = %self.state, "Connect ignored, session already active");
            return;
        }

        self.intentional_close = false;
        if self.exhausted {
            debug!("Retry budget restored by explicit connect");
            self.exhausted = false;
            self.reconnect.reset();
        }
        self.timers.cancel(TimerKind::Reconnect);
        self.open_session();
    }

    /// Intentional close. Idempotent.
    fn close(&mut self) {
        let was_active = self.state.is_active();
        let cancelled = self.timers.cancel_all();

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        if let Some(session) = self.session.take() {
            self.state = ConnectionState::Closing;
            session.force_close(CloseReason::normal());
        }

        self.intentional_close = true;
        self.state = ConnectionState::Disconnected;
        self.heartbeat.reset();

        let discarded = self.queue.clear();
        self.shared.depth.release(discarded);

        if was_active || discarded > 0 || cancelled > 0 {
            info!(epoch = %self.epoch, discarded, cancelled_timers = cancelled, "Supervisor closed");
        }

        if was_active {
            self.emitter.emit(Event::Disconnect(CloseReason::normal()));
        }
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Advances the epoch and spawns a pump for a new session.
    fn open_session(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        self.epoch = self.epoch.next();
        self.state = ConnectionState::Connecting;

        debug!(epoch = %self.epoch, attempt = self.reconnect.attempt_count(), "Opening session");

        self.pump = Some(tokio::spawn(pump_session(
            self.epoch,
            Arc::clone(&self.transport),
            self.url.clone(),
            self.config.connect_timeout(),
            self.signal_tx.clone(),
        )));
    }

    fn handle_signal(&mut self, signal: Signal) {
        let Signal { epoch, kind } = signal;

        if epoch != self.epoch {
            trace!(%epoch, current = %self.epoch, "Dropping signal from superseded session");
            if let SignalKind::Opened(session) = kind {
                session.force_close(CloseReason::new(CloseCode::Normal, "superseded"));
            }
            return;
        }

        match kind {
            SignalKind::Opened(session) => self.on_opened(session),
            SignalKind::OpenFailed(error) => self.on_open_failed(&error),
            SignalKind::Transport(TransportEvent::Message(text)) => self.on_frame(&text),
            SignalKind::Transport(TransportEvent::Error(message)) => {
                warn!(%epoch, %message, "Transport error");
            }
            SignalKind::Transport(TransportEvent::Closed(reason)) => self.on_closed(reason),
        }
    }

    fn on_opened(&mut self, session: Box<dyn TransportSession>) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Session opened after it was abandoned");
            session.force_close(CloseReason::normal());
            return;
        }

        self.state = ConnectionState::Open;
        self.session = Some(session);
        self.sessions_opened += 1;
        self.reconnect.reset();
        self.heartbeat.reset();
        self.timers
            .schedule_repeating(TimerKind::Heartbeat, self.config.heartbeat_interval());

        info!(epoch = %self.epoch, queued = self.queue.len(), "Session open");
        self.emitter.emit(Event::Open { epoch: self.epoch });

        self.drain_queue();
    }

    fn on_open_failed(&mut self, error: &Error) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        warn!(epoch = %self.epoch, %error, "Session failed to open");
        self.handle_disconnect(CloseReason::abnormal(error.to_string()));
    }

    fn on_frame(&mut self, text: &str) {
        if !self.state.is_open() {
            return;
        }

        match InboundFrame::parse(text, self.config.max_frame_len()) {
            Ok(InboundFrame::Pong) => {
                trace!(epoch = %self.epoch, "Pong received");
                self.heartbeat.record_pong(Instant::now());
                self.timers.cancel(TimerKind::PongDeadline);
            }
            Ok(InboundFrame::Application(value)) => {
                self.emitter.emit(Event::Message(value));
            }
            Err(e) => {
                warn!(epoch = %self.epoch, error = %e, "Discarding malformed frame");
            }
        }
    }

    fn on_closed(&mut self, reason: CloseReason) {
        if !self.state.is_active() {
            return;
        }
        info!(epoch = %self.epoch, %reason, "Session closed");
        self.handle_disconnect(reason);
    }

    /// Tears down after an unintended loss and schedules recovery.
    fn handle_disconnect(&mut self, reason: CloseReason) {
        self.timers.cancel(TimerKind::Heartbeat);
        self.timers.cancel(TimerKind::PongDeadline);

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.session = None;
        self.heartbeat.reset();
        self.state = ConnectionState::Disconnected;

        self.emitter.emit(Event::Disconnect(reason));
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.intentional_close || self.exhausted {
            return;
        }

        let max_retries = self.config.max_retries();
        match self.reconnect.next_attempt(max_retries) {
            Some(delay) => {
                info!(
                    attempt = self.reconnect.attempt_count(),
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                self.timers.schedule_once(TimerKind::Reconnect, delay);
            }
            None => {
                self.exhausted = true;
                let attempts = self.reconnect.attempt_count();
                error!(attempts, "Reconnect attempts exhausted");
                self.emitter
                    .emit(Event::FatalError(Arc::new(Error::reconnect_exhausted(attempts))));
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn handle_timer(&mut self, fired: TimerFired<TimerKind>) {
        if !self.timers.accept(&fired) {
            trace!(key = ?fired.key, "Dropping stale timer fire");
            return;
        }

        match fired.key {
            TimerKind::Heartbeat => self.on_heartbeat_tick(),
            TimerKind::PongDeadline => self.on_pong_deadline(),
            TimerKind::Reconnect => self.on_reconnect_due(),
        }
    }

    fn on_heartbeat_tick(&mut self) {
        if !self.state.is_open() {
            return;
        }

        let now = Instant::now();
        let pong_timeout = self.config.pong_timeout();
        if self.heartbeat.is_expired(now, pong_timeout) {
            self.liveness_failure();
            return;
        }

        let handed_off = match (ControlFrame::Ping.encode(), self.session.as_deref()) {
            (Ok(frame), Some(session)) => session.send(frame),
            (Err(e), _) => {
                error!(error = %e, "Failed to encode ping");
                false
            }
            (_, None) => false,
        };
        if !handed_off {
            debug!(epoch = %self.epoch, "Ping not handed off");
        }

        self.heartbeat.record_ping(now);
        trace!(epoch = %self.epoch, "Ping sent");

        if !self.timers.is_scheduled(TimerKind::PongDeadline) {
            let remaining = self.pong_deadline_remaining(now, pong_timeout);
            self.timers.schedule_once(TimerKind::PongDeadline, remaining);
        }
    }

    fn on_pong_deadline(&mut self) {
        if !self.state.is_open() {
            return;
        }
        if self.heartbeat.is_expired(Instant::now(), self.config.pong_timeout()) {
            self.liveness_failure();
        }
    }

    fn on_reconnect_due(&mut self) {
        if self.intentional_close || self.state != ConnectionState::Disconnected {
            return;
        }
        self.open_session();
    }

    /// Time left before the oldest unanswered ping expires.
    fn pong_deadline_remaining(&self, now: Instant, pong_timeout: Duration) -> Duration {
        self.heartbeat
            .unanswered_since
            .map_or(pong_timeout, |since| {
                pong_timeout.saturating_sub(now.saturating_duration_since(since))
            })
    }

    fn liveness_failure(&mut self) {
        let reason = CloseReason::liveness_failure();
        warn!(
            epoch = %self.epoch,
            pong_timeout_ms = self.config.pong_timeout().as_millis() as u64,
            "No pong within timeout, closing session"
        );
        if let Some(session) = &self.session {
            session.force_close(reason.clone());
        }
        self.handle_disconnect(reason);
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Hands queued messages to the open session in order.
    fn drain_queue(&mut self) {
        let Some(session) = self.session.as_deref() else {
            return;
        };

        let outcome = self.queue.drain(|message| match message.encode() {
            Ok(frame) => session.send(frame),
            Err(e) => {
                error!(id = %message.client_message_id, error = %e, "Dropping unencodable message");
                true
            }
        });

        self.shared.depth.release(outcome.sent);

        if outcome.stalled {
            warn!(epoch = %self.epoch, remaining = self.queue.len(), "Handoff refused, message kept at head");
        } else if outcome.sent > 0 {
            trace!(epoch = %self.epoch, sent = outcome.sent, "Queue drained");
        }
    }

    fn publish_stats(&self) {
        *self.shared.stats.write() = SupervisorStats {
            state: self.state,
            epoch: self.epoch,
            reconnect_attempts: self.reconnect.attempt_count(),
            queued: self.queue.len(),
            live_timers: self.timers.len(),
            sessions_opened: self.sessions_opened,
            exhausted: self.exhausted,
        };
    }
}

// ============================================================================
// Session Pump
// ============================================================================

/// Opens one session and forwards everything it reports, tagged with `epoch`.
///
/// `Opened` is always posted before any transport event, and exactly one
/// terminal signal (`OpenFailed` or `Closed`) follows unless the pump is
/// aborted.
async fn pump_session(
    epoch: Epoch,
    transport: Arc<dyn Transport>,
    url: Url,
    connect_timeout: Duration,
    signals: mpsc::UnboundedSender<Signal>,
) {
    let opened = match timeout(connect_timeout, transport.open(&url)).await {
        Ok(result) => result,
        Err(_) => Err(Error::connection_timeout(connect_timeout.as_millis() as u64)),
    };

    let OpenedSession {
        session,
        mut events,
    } = match opened {
        Ok(opened) => opened,
        Err(e) => {
            let _ = signals.send(Signal::new(epoch, SignalKind::OpenFailed(e)));
            return;
        }
    };

    if signals
        .send(Signal::new(epoch, SignalKind::Opened(session)))
        .is_err()
    {
        return;
    }

    while let Some(event) = events.recv().await {
        let terminal = matches!(event, TransportEvent::Closed(_));
        let delivered = signals
            .send(Signal::new(epoch, SignalKind::Transport(event)))
            .is_ok();
        if terminal || !delivered {
            return;
        }
    }

    let _ = signals.send(Signal::new(
        epoch,
        SignalKind::Transport(TransportEvent::Closed(CloseReason::abnormal(
            "transport event stream ended",
        ))),
    ));
}

// ============================================================================
// Tests
// ============================================================================
