//! In-memory transport and helpers for driving `SessionClient` in tests.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use companion_session::{
    ConnectRequest, ConnectionState, ConnectionStatus, InboundFrame, ReadyState, SessionClient,
    SessionConfig, SessionEvent, StaticToken, Transport, TransportError, TransportEvent,
    TransportFactory, TransportHandle,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

/// Short timings so tests finish quickly
pub fn test_config() -> SessionConfig {
    SessionConfig {
        endpoint: "ws://fake.test/v1/realtime".to_string(),
        backoff_base_ms: 25,
        backoff_max_ms: 400,
        backoff_cap_exponent: 8,
        jitter_factor: 0.0,
        keepalive_interval_ms: 40,
        status_debounce_ms: 30,
        ..SessionConfig::default()
    }
}

pub struct FakeSocket {
    state: Mutex<ReadyState>,
    pub sent: Mutex<Vec<String>>,
    pub closed_with: Mutex<Option<(u16, String)>>,
    pub fail_sends: AtomicBool,
}

impl FakeSocket {
    fn new() -> Self {
        Self {
            state: Mutex::new(ReadyState::Connecting),
            sent: Mutex::new(Vec::new()),
            closed_with: Mutex::new(None),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect()
    }

    pub fn sent_of_type(&self, frame_type: &str) -> Vec<serde_json::Value> {
        self.sent_json()
            .into_iter()
            .filter(|v| v["type"] == frame_type)
            .collect()
    }
}

impl Transport for FakeSocket {
    fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }

    fn send(&self, text: String) -> anyhow::Result<()> {
        if *self.state.lock() != ReadyState::Open {
            anyhow::bail!("fake socket not open");
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("fake socket send failure");
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        *self.state.lock() = ReadyState::Closed;
        *self.closed_with.lock() = Some((code, reason.to_string()));
    }
}

/// Server side of one fake connection
pub struct FakeConn {
    pub request: ConnectRequest,
    pub socket: Arc<FakeSocket>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl FakeConn {
    pub fn open(&self) {
        *self.socket.state.lock() = ReadyState::Open;
        let _ = self.events.send(TransportEvent::Opened);
    }

    pub fn deliver(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Message(text.to_string()));
    }

    pub fn server_close(&self) {
        *self.socket.state.lock() = ReadyState::Closed;
        let _ = self.events.send(TransportEvent::Closed {
            code: Some(1006),
            reason: "server went away".to_string(),
        });
    }

    pub fn error(&self) {
        let _ = self
            .events
            .send(TransportEvent::Errored("connection reset".to_string()));
        self.server_close();
    }

    pub fn resume_from(&self) -> Option<u64> {
        query_param(&self.request.url, "resume_from").and_then(|v| v.parse().ok())
    }

    pub fn session_id(&self) -> Option<String> {
        query_param(&self.request.url, "session_id")
    }
}

fn query_param(raw: &str, name: &str) -> Option<String> {
    let url = url::Url::parse(raw).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryMode {
    Accept,
    Refuse,
    Unavailable,
    InvalidRequest,
}

pub struct FakeFactory {
    mode: Mutex<FactoryMode>,
    auto_open: AtomicBool,
    open_delay: Mutex<Option<Duration>>,
    open_calls: AtomicUsize,
    conns: Mutex<Vec<Arc<FakeConn>>>,
}

impl FakeFactory {
    pub fn new(mode: FactoryMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            auto_open: AtomicBool::new(true),
            open_delay: Mutex::new(None),
            open_calls: AtomicUsize::new(0),
            conns: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: FactoryMode) {
        *self.mode.lock() = mode;
    }

    pub fn set_auto_open(&self, auto_open: bool) {
        self.auto_open.store(auto_open, Ordering::SeqCst);
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn conns(&self) -> Vec<Arc<FakeConn>> {
        self.conns.lock().clone()
    }

    pub fn last(&self) -> Arc<FakeConn> {
        self.conns
            .lock()
            .last()
            .cloned()
            .expect("no connection opened yet")
    }
}

#[async_trait::async_trait]
impl TransportFactory for FakeFactory {
    async fn open(&self, request: ConnectRequest) -> Result<TransportHandle, TransportError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.open_delay.lock();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mode = *self.mode.lock();
        match mode {
            FactoryMode::Refuse => Err(TransportError::Connect(anyhow::anyhow!(
                "connection refused"
            ))),
            FactoryMode::Unavailable => Err(TransportError::Unavailable(
                "no websocket implementation".to_string(),
            )),
            FactoryMode::InvalidRequest => Err(TransportError::InvalidRequest(
                "invalid value for header Authorization".to_string(),
            )),
            FactoryMode::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                let socket = Arc::new(FakeSocket::new());
                let conn = Arc::new(FakeConn {
                    request,
                    socket: socket.clone(),
                    events: tx,
                });
                if self.auto_open.load(Ordering::SeqCst) {
                    conn.open();
                }
                self.conns.lock().push(conn);
                Ok(TransportHandle { socket, events: rx })
            }
        }
    }
}

/// Collects observer events as they arrive
pub struct Recorder {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    events: Vec<SessionEvent>,
}

impl Recorder {
    pub fn drain(&mut self) -> &[SessionEvent] {
        while let Ok(event) = self.rx.try_recv() {
            self.events.push(event);
        }
        &self.events
    }

    pub fn statuses(&mut self) -> Vec<ConnectionStatus> {
        self.drain()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn states(&mut self) -> Vec<ConnectionState> {
        self.statuses().into_iter().map(|s| s.state).collect()
    }

    pub fn frames(&mut self) -> Vec<InboundFrame> {
        self.drain()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Frame(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }
}

pub struct Harness {
    pub client: SessionClient,
    pub factory: Arc<FakeFactory>,
    pub recorder: Recorder,
}

pub fn harness(mode: FactoryMode) -> Harness {
    harness_with(mode, StaticToken::new("test-token"))
}

pub fn harness_with(mode: FactoryMode, token: StaticToken) -> Harness {
    harness_with_config(mode, token, test_config())
}

pub fn harness_with_config(mode: FactoryMode, token: StaticToken, config: SessionConfig) -> Harness {
    let factory = FakeFactory::new(mode);
    let (tx, rx) = mpsc::unbounded_channel();
    let client = SessionClient::new(config, Arc::new(token), factory.clone(), Arc::new(tx));
    Harness {
        client,
        factory,
        recorder: Recorder {
            rx,
            events: Vec::new(),
        },
    }
}

/// Poll `cond` until it holds or two seconds pass
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}
