//! Resumable realtime session client.
//!
//! All mutable state sits behind one mutex. Every asynchronous callback
//! (socket events, reconnect timer, keepalive, status flush) re-enters through
//! that mutex and proves it is still current (socket id or timer token) before
//! doing anything, so `disconnect()` is a single synchronous cut-off.
//!
//! Observer notifications are queued in state order while the mutex is held
//! and delivered only after it is released, so observers may call back into
//! the client.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::backoff::{BackoffPolicy, ReconnectScheduler};
use super::coalescer::{Admission, AttemptCoalescer};
use super::frame::{InboundFrame, OutboundFrame};
use super::liveness::Liveness;
use super::observer::{SessionEvent, SessionObserver};
use super::sequence::SequenceTracker;
use super::status::{ConnectionState, ConnectionStatus};
use crate::config::SessionConfig;
use crate::credentials::CredentialProvider;
use crate::error::{SessionError, TransportError};
use crate::metrics::SessionMetrics;
use crate::transport::{ConnectRequest, Transport, TransportEvent, TransportFactory, TransportHandle};

/// Normal closure
const CLOSE_NORMAL: u16 = 1000;

// =============================================================================
// TRANSITIONS
// =============================================================================

/// Reason for a status transition (for logging)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    ConnectRequested,
    SessionChanged,
    SocketOpened,
    SocketClosed,
    SocketErrored,
    DisconnectRequested,
    FatalError,
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectRequested => write!(f, "connect_requested"),
            Self::SessionChanged => write!(f, "session_changed"),
            Self::SocketOpened => write!(f, "socket_opened"),
            Self::SocketClosed => write!(f, "socket_closed"),
            Self::SocketErrored => write!(f, "socket_errored"),
            Self::DisconnectRequested => write!(f, "disconnect_requested"),
            Self::FatalError => write!(f, "fatal_error"),
        }
    }
}

/// Which timers are armed right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerSnapshot {
    pub reconnect: bool,
    pub keepalive: bool,
    pub status_flush: bool,
}

impl TimerSnapshot {
    pub fn none_armed(&self) -> bool {
        !(self.reconnect || self.keepalive || self.status_flush)
    }
}

enum AttemptError {
    Fatal(SessionError),
    Transient(anyhow::Error),
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct LiveSocket {
    id: u64,
    socket: Arc<dyn Transport>,
    opened: bool,
    pump: JoinHandle<()>,
}

struct State {
    desired: bool,
    /// Bumped by disconnect and session changes; attempts started under an
    /// older epoch discard their result.
    epoch: u64,
    next_socket_id: u64,
    sequence: SequenceTracker,
    coalescer: AttemptCoalescer,
    reconnect: ReconnectScheduler,
    liveness: Liveness,
    socket: Option<LiveSocket>,
}

impl State {
    fn socket_open(&self) -> bool {
        self.socket.as_ref().is_some_and(|s| s.opened)
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: ConnectionState::derive(self.desired, self.socket_open()),
            session_id: self.sequence.session_id().map(str::to_owned),
            last_seq: self.sequence.resume_point(),
        }
    }

    fn live_socket(&self) -> Result<&Arc<dyn Transport>, SessionError> {
        match &self.socket {
            Some(live) if live.opened => Ok(&live.socket),
            _ => Err(SessionError::NotConnected),
        }
    }

    /// Drop the current socket; `abort_pump` only when called from outside the pump
    fn drop_socket(&mut self, reason: &str, abort_pump: bool) {
        if let Some(live) = self.socket.take() {
            live.socket.close(CLOSE_NORMAL, reason);
            if abort_pump {
                live.pump.abort();
            }
        }
        self.liveness.stop_keepalive();
    }
}

struct Inner {
    config: SessionConfig,
    credentials: Arc<dyn CredentialProvider>,
    transports: Arc<dyn TransportFactory>,
    observer: Arc<dyn SessionObserver>,
    metrics: SessionMetrics,
    state: Mutex<State>,
    /// Filled only while `state` is held, drained only while it is not
    outbox: Mutex<VecDeque<SessionEvent>>,
    /// Held by whichever thread is currently delivering the outbox
    delivering: Mutex<()>,
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Handle to one logical realtime session. Cheap to clone; all clones share
/// the same connection.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("status", &self.status())
            .finish()
    }
}

impl SessionClient {
    pub fn new(
        config: SessionConfig,
        credentials: Arc<dyn CredentialProvider>,
        transports: Arc<dyn TransportFactory>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let state = State {
            desired: false,
            epoch: 0,
            next_socket_id: 0,
            sequence: SequenceTracker::new(),
            coalescer: AttemptCoalescer::default(),
            reconnect: ReconnectScheduler::new(BackoffPolicy::from_config(&config)),
            liveness: Liveness::new(config.keepalive_interval(), config.status_debounce()),
            socket: None,
        };

        Self {
            inner: Arc::new(Inner {
                config,
                credentials,
                transports,
                observer,
                metrics: SessionMetrics::new(),
                state: Mutex::new(state),
                outbox: Mutex::new(VecDeque::new()),
                delivering: Mutex::new(()),
            }),
        }
    }

    /// Connect to `session_id`, or re-assert intent if already connected to it.
    ///
    /// Resolves once this call's attempt has finished (or was folded into one
    /// already running). Only caller misuse and fatal conditions are returned;
    /// network failures are retried in the background.
    pub async fn connect(&self, session_id: &str) -> Result<(), SessionError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(SessionError::InvalidSessionId);
        }

        {
            let mut st = self.inner.state.lock();
            let prev = st.status();
            let changed = st.sequence.bind(session_id);

            let reason = if changed {
                st.epoch += 1;
                st.drop_socket("session changed", true);
                TransitionReason::SessionChanged
            } else if st.desired && st.socket.is_some() {
                debug!(session_id, "connect_already_active");
                return Ok(());
            } else {
                TransitionReason::ConnectRequested
            };

            st.desired = true;
            st.reconnect.cancel();
            st.reconnect.reset();
            self.inner.transition(&st, &prev, reason, false);
        }
        self.inner.deliver();

        self.inner.clone().attempt().await
    }

    /// Tear everything down. Synchronous: once this returns no timer, socket
    /// or in-flight attempt can start another observer callback, apart from
    /// the `disconnected` status this call itself reports.
    pub fn disconnect(&self) {
        {
            let mut st = self.inner.state.lock();
            let prev = st.status();

            st.desired = false;
            st.epoch += 1;
            st.coalescer.clear_pending();
            st.reconnect.cancel();
            st.reconnect.reset();
            st.liveness.cancel_all();
            st.drop_socket("client disconnect", true);

            // Anything not yet delivered belongs to the torn-down connection
            self.inner.outbox.lock().clear();
            self.inner
                .transition(&st, &prev, TransitionReason::DisconnectRequested, true);
        }
        self.inner.deliver();
        info!(metrics = %self.inner.metrics.summary(), "session_metrics");
    }

    /// Current status, recomputed from the client's flags
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().status()
    }

    pub fn resume_point(&self) -> u64 {
        self.inner.state.lock().sequence.resume_point()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .sequence
            .session_id()
            .map(str::to_owned)
    }

    /// Current reconnect attempt number (0 while connected)
    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.state.lock().reconnect.attempt()
    }

    pub fn timers(&self) -> TimerSnapshot {
        let st = self.inner.state.lock();
        TimerSnapshot {
            reconnect: st.reconnect.is_armed(),
            keepalive: st.liveness.keepalive_armed(),
            status_flush: st.liveness.status_flush_armed(),
        }
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.inner.metrics
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Send any outbound frame over the open socket. Fails fast with
    /// `NotConnected` (and no socket traffic) when not connected.
    pub fn send_frame(&self, frame: &OutboundFrame) -> Result<(), SessionError> {
        let st = self.inner.state.lock();
        let socket = st.live_socket()?;
        let text = frame.encode()?;
        socket.send(text).map_err(SessionError::Send)
    }

    /// Application send: `CHAT_SEND`
    pub fn send_chat(
        &self,
        text: impl Into<String>,
        client_request_id: Option<String>,
    ) -> Result<(), SessionError> {
        self.send_frame(&OutboundFrame::chat(text, client_request_id))
    }

    /// Control send: `INTERRUPT`
    pub fn send_interrupt(&self) -> Result<(), SessionError> {
        self.send_frame(&OutboundFrame::Interrupt)
    }
}

// =============================================================================
// OBSERVER DELIVERY
// =============================================================================

impl Inner {
    /// Queue a notification. Caller holds `state`, which fixes the order.
    fn notify(&self, event: SessionEvent) {
        self.outbox.lock().push_back(event);
    }

    /// Log a lifecycle transition and notify if it changed anything
    fn transition(
        &self,
        st: &State,
        prev: &ConnectionStatus,
        reason: TransitionReason,
        always_emit: bool,
    ) {
        let next = st.status();
        if !always_emit && next == *prev {
            return;
        }
        info!(
            from = %prev.state,
            to = %next.state,
            reason = %reason,
            session_id = next.session_id.as_deref().unwrap_or(""),
            last_seq = next.last_seq,
            "session_transition"
        );
        self.notify(SessionEvent::Status(next));
    }

    /// Drain the outbox into the observer. Must be called without `state` held.
    ///
    /// One thread delivers at a time. A nested call from inside a callback
    /// (or from another thread mid-delivery) returns at once and its events
    /// are picked up by the running loop, in order.
    fn deliver(&self) {
        loop {
            let Some(delivering) = self.delivering.try_lock() else {
                return;
            };
            while let Some(event) = self.next_event() {
                match &event {
                    SessionEvent::Status(status) => self.observer.on_status(status),
                    SessionEvent::Frame(frame) => self.observer.on_frame(frame),
                }
            }
            drop(delivering);

            // Something queued between the last pop and the unlock
            if self.outbox.lock().is_empty() {
                return;
            }
        }
    }

    fn next_event(&self) -> Option<SessionEvent> {
        self.outbox.lock().pop_front()
    }
}

// =============================================================================
// CONNECTION ATTEMPTS
// =============================================================================

impl Inner {
    /// Run one connection attempt, restarting once per coalesced request.
    async fn attempt(self: Arc<Self>) -> Result<(), SessionError> {
        loop {
            let (epoch, session_id, resume_from) = {
                let mut st = self.state.lock();
                if !st.desired || st.socket.is_some() {
                    return Ok(());
                }
                if st.coalescer.try_begin() == Admission::Coalesced {
                    debug!("connect_coalesced");
                    return Ok(());
                }
                let Some(session_id) = st.sequence.session_id().map(str::to_owned) else {
                    st.coalescer.finish();
                    return Ok(());
                };
                st.reconnect.cancel();
                (st.epoch, session_id, st.sequence.resume_point())
            };

            self.metrics.record_connect_attempt();
            debug!(session_id = %session_id, resume_from, "connect_attempt");
            let outcome = self.open_socket(&session_id, resume_from).await;

            let restart = {
                let mut st = self.state.lock();
                let restart = st.coalescer.finish();
                let stale = !st.desired || st.epoch != epoch;

                match outcome {
                    Ok(handle) if stale => {
                        debug!(session_id = %session_id, "connect_attempt_superseded");
                        handle.socket.close(CLOSE_NORMAL, "superseded");
                        Ok(restart)
                    }
                    Ok(handle) => {
                        self.install_socket(&mut st, handle);
                        Ok(restart)
                    }
                    Err(AttemptError::Fatal(err)) if stale => {
                        debug!(error = %err, "stale_attempt_failed");
                        Ok(restart)
                    }
                    Err(AttemptError::Fatal(err)) => {
                        self.fail_fatal(&mut st, &err);
                        Err(err)
                    }
                    Err(AttemptError::Transient(err)) => {
                        self.metrics.record_connect_failure();
                        if !stale {
                            warn!(error = %err, session_id = %session_id, "connect_attempt_failed");
                            self.schedule_reconnect(&mut st);
                        }
                        Ok(restart)
                    }
                }
            };
            self.deliver();

            if !restart? {
                return Ok(());
            }
        }
    }

    async fn open_socket(
        &self,
        session_id: &str,
        resume_from: u64,
    ) -> Result<TransportHandle, AttemptError> {
        let token = self
            .credentials
            .access_token()
            .await
            .map_err(|e| AttemptError::Fatal(SessionError::Credentials(e)))?
            .ok_or(AttemptError::Fatal(SessionError::MissingCredentials))?;

        let url = handshake_url(&self.config.endpoint, session_id, resume_from)
            .map_err(AttemptError::Fatal)?;
        let request = ConnectRequest {
            url,
            headers: vec![("Authorization".to_string(), format!("Bearer {token}"))],
        };

        match self.transports.open(request).await {
            Ok(handle) => Ok(handle),
            Err(TransportError::Unavailable(reason)) => Err(AttemptError::Fatal(
                SessionError::TransportUnavailable(reason),
            )),
            Err(TransportError::InvalidRequest(reason)) => Err(AttemptError::Fatal(
                SessionError::InvalidRequest(reason),
            )),
            Err(TransportError::Connect(err)) => Err(AttemptError::Transient(err)),
        }
    }

    fn fail_fatal(&self, st: &mut State, err: &SessionError) {
        let prev = st.status();
        st.desired = false;
        st.coalescer.clear_pending();
        st.reconnect.cancel();
        st.reconnect.reset();
        st.liveness.cancel_all();
        st.drop_socket("fatal error", true);

        error!(error = %err, "session_connect_fatal");
        self.transition(st, &prev, TransitionReason::FatalError, true);
    }
}

// =============================================================================
// SOCKET EVENTS
// =============================================================================

impl Inner {
    fn install_socket(self: &Arc<Self>, st: &mut State, handle: TransportHandle) {
        st.next_socket_id += 1;
        let id = st.next_socket_id;

        let weak = Arc::downgrade(self);
        let mut events = handle.events;
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { return };
                if !inner.handle_event(id, event) {
                    return;
                }
            }
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(
                    id,
                    TransportEvent::Closed {
                        code: None,
                        reason: "event stream ended".to_string(),
                    },
                );
            }
        });

        st.socket = Some(LiveSocket {
            id,
            socket: handle.socket,
            opened: false,
            pump,
        });
    }

    /// Dispatch one socket event. Returns false once the pump should stop.
    fn handle_event(self: &Arc<Self>, socket_id: u64, event: TransportEvent) -> bool {
        let keep_going = {
            let mut st = self.state.lock();
            if st.socket.as_ref().map(|s| s.id) != Some(socket_id) {
                return false;
            }

            match event {
                TransportEvent::Opened => {
                    let prev = st.status();
                    if let Some(live) = st.socket.as_mut() {
                        live.opened = true;
                    }
                    st.reconnect.cancel();
                    st.reconnect.reset();
                    self.metrics.record_connect_opened();
                    self.start_keepalive(&mut st, socket_id);
                    self.transition(&st, &prev, TransitionReason::SocketOpened, false);
                    true
                }
                TransportEvent::Message(text) => {
                    self.handle_message(&mut st, &text);
                    true
                }
                TransportEvent::Errored(err) => {
                    debug!(error = %err, "socket_error");
                    self.handle_socket_down(&mut st, TransitionReason::SocketErrored);
                    false
                }
                TransportEvent::Closed { code, reason } => {
                    debug!(code = ?code, reason = %reason, "socket_closed");
                    self.handle_socket_down(&mut st, TransitionReason::SocketClosed);
                    false
                }
            }
        };
        self.deliver();
        keep_going
    }

    fn handle_message(self: &Arc<Self>, st: &mut State, text: &str) {
        self.metrics.record_frame();

        let Some(frame) = InboundFrame::parse(text) else {
            self.metrics.record_malformed_frame();
            debug!(bytes = text.len(), "malformed_frame_dropped");
            return;
        };

        let disposition = st.sequence.observe(&frame);
        if disposition.advanced {
            trace!(resume_point = st.sequence.resume_point(), "resume_point_advanced");
            self.request_status_flush(st);
        }

        if let Some(cursor) = disposition.ack {
            let sent = send_best_effort(st, &OutboundFrame::ack(cursor));
            self.metrics.record_ack(sent);
        }

        self.notify(SessionEvent::Frame(frame));
    }

    fn handle_socket_down(self: &Arc<Self>, st: &mut State, reason: TransitionReason) {
        let prev = st.status();
        st.drop_socket("socket down", false);
        self.metrics.record_socket_close();

        self.transition(st, &prev, reason, false);
        if st.desired {
            self.schedule_reconnect(st);
        }
    }
}

// =============================================================================
// TIMERS
// =============================================================================

impl Inner {
    fn schedule_reconnect(self: &Arc<Self>, st: &mut State) {
        if !st.desired {
            return;
        }

        let weak = Arc::downgrade(self);
        let scheduled = st.reconnect.schedule(move |token| async move {
            let Some(inner) = weak.upgrade() else { return };
            let go = {
                let mut st = inner.state.lock();
                st.reconnect.take_fired(token) && st.desired
            };
            if go {
                if let Err(e) = inner.attempt().await {
                    error!(error = %e, "reconnect_failed_fatally");
                }
            }
        });

        if let Some((attempt, delay)) = scheduled {
            self.metrics.record_reconnect_scheduled();
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnect_scheduled"
            );
        }
    }

    fn start_keepalive(self: &Arc<Self>, st: &mut State, socket_id: u64) {
        let weak = Arc::downgrade(self);
        let period = st.liveness.keepalive_interval();

        st.liveness.start_keepalive(move |token| async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { return };
                if !inner.keepalive_tick(token, socket_id) {
                    return;
                }
            }
        });
    }

    fn keepalive_tick(&self, token: u64, socket_id: u64) -> bool {
        let st = self.state.lock();
        if !st.liveness.keepalive_is_current(token)
            || st.socket.as_ref().map(|s| s.id) != Some(socket_id)
        {
            return false;
        }
        let sent = send_best_effort(&st, &OutboundFrame::ping_now());
        self.metrics.record_ping(sent);
        true
    }

    fn request_status_flush(self: &Arc<Self>, st: &mut State) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        st.liveness.request_status_flush(move |token| async move {
            let Some(inner) = weak.upgrade() else { return };
            {
                let mut st = inner.state.lock();
                if st.liveness.take_status_flush(token) {
                    inner.notify(SessionEvent::Status(st.status()));
                }
            }
            inner.deliver();
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        st.desired = false;
        st.reconnect.cancel();
        st.liveness.cancel_all();
        st.drop_socket("client dropped", true);
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Protocol frames (ack, ping) never fail the session
fn send_best_effort(st: &State, frame: &OutboundFrame) -> bool {
    let result = st
        .live_socket()
        .and_then(|socket| socket.send(frame.encode()?).map_err(SessionError::Send));
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, frame = ?frame, "protocol_frame_dropped");
            false
        }
    }
}

/// Endpoint plus `session_id` and `resume_from` query parameters
pub fn handshake_url(
    endpoint: &str,
    session_id: &str,
    resume_from: u64,
) -> Result<String, SessionError> {
    let mut url = url::Url::parse(endpoint)
        .map_err(|e| SessionError::TransportUnavailable(format!("invalid endpoint url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("session_id", session_id)
        .append_pair("resume_from", &resume_from.to_string());
    Ok(url.to_string())
}
