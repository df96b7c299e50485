//! Companion Session Library
//!
//! Keeps one authenticated realtime channel alive for a logical session on
//! behalf of an untrusted UI: idempotent connect, gap-free resume across
//! reconnects, capped backoff, keepalive, and a synchronous teardown.

pub mod config;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use credentials::{CredentialProvider, EnvToken, StaticToken};
pub use error::{SessionError, TransportError};
pub use metrics::SessionMetrics;
pub use session::{
    ConnectionState, ConnectionStatus, InboundFrame, OutboundFrame, SessionClient, SessionEvent,
    SessionObserver,
};
pub use transport::{
    ConnectRequest, ReadyState, Transport, TransportEvent, TransportFactory, TransportHandle,
    WebSocketTransportFactory,
};
