//! Error types surfaced by the session client and its transports.

use thiserror::Error;

/// Errors returned to callers of [`crate::SessionClient`].
///
/// Only caller misuse and fatal conditions reach this type. Transient network
/// failures are absorbed by the reconnect scheduler and only show up as status
/// changes.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `connect` was called without a usable session id
    #[error("session id must not be empty")]
    InvalidSessionId,

    /// A send was attempted while the session is not connected
    #[error("session is not connected")]
    NotConnected,

    /// The credential provider had no access token
    #[error("no access token available")]
    MissingCredentials,

    /// The credential provider itself failed
    #[error("credential provider failed: {0}")]
    Credentials(#[source] anyhow::Error),

    /// No transport could be constructed in this environment
    #[error("no usable transport available: {0}")]
    TransportUnavailable(String),

    /// The handshake request can never be sent as built (e.g. a token that is
    /// not a legal header value)
    #[error("invalid connect request: {0}")]
    InvalidRequest(String),

    /// Outbound frame could not be serialized
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// The live socket refused the frame
    #[error("failed to send frame: {0}")]
    Send(#[source] anyhow::Error),
}

impl SessionError {
    /// Fatal errors force the client back to `disconnected` and stop retries
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials
                | Self::Credentials(_)
                | Self::TransportUnavailable(_)
                | Self::InvalidRequest(_)
        )
    }
}

/// Errors produced by a [`crate::transport::TransportFactory`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Nothing in this environment can open a socket for the request
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The request itself is malformed; retrying cannot help
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The socket could not be opened this time; worth retrying
    #[error("connect failed: {0}")]
    Connect(#[source] anyhow::Error),
}
