//! Duplex socket abstraction consumed by the session client.
//!
//! A factory opens one socket per connection attempt. The socket is driven by
//! a stream of [`TransportEvent`]s instead of registered listeners, so the
//! client can dispatch every callback through a single state machine.

pub mod websocket;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::TransportError;

pub use websocket::WebSocketTransportFactory;

/// Socket lifecycle, same meaning as the browser `readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Everything a socket can report back to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Errored(String),
    Closed { code: Option<u16>, reason: String },
}

/// What the client asks the factory to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl ConnectRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One open (or opening) duplex socket
pub trait Transport: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame. Never blocks; fails if the socket is not open.
    fn send(&self, text: String) -> anyhow::Result<()>;

    fn close(&self, code: u16, reason: &str);
}

/// A freshly opened socket together with its event stream
pub struct TransportHandle {
    pub socket: Arc<dyn Transport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("ready_state", &self.socket.ready_state())
            .finish()
    }
}

#[async_trait::async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a socket for `request`.
    ///
    /// `TransportError::Unavailable` is fatal for the session;
    /// `TransportError::Connect` is retried with backoff.
    async fn open(&self, request: ConnectRequest) -> Result<TransportHandle, TransportError>;
}
