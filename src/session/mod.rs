//! Resumable realtime session: state machine, reconnect scheduling, sequence
//! tracking and liveness.

pub mod backoff;
pub mod client;
pub mod coalescer;
pub mod frame;
pub mod liveness;
pub mod observer;
pub mod sequence;
pub mod status;
pub mod timer;

pub use client::{handshake_url, SessionClient, TimerSnapshot, TransitionReason};
pub use frame::{InboundFrame, OutboundFrame};
pub use observer::{NoopObserver, SessionEvent, SessionObserver};
pub use status::{ConnectionState, ConnectionStatus};
