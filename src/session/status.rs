//! Observer-facing connection status.

use serde::{Deserialize, Serialize};

/// Three-valued connection state exposed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection wanted (initial and terminal)
    Disconnected,
    /// Connection wanted but no open socket
    Reconnecting,
    /// Socket open
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

impl ConnectionState {
    /// Derive the state from the client's flags. Never stored.
    pub fn derive(desired: bool, socket_open: bool) -> Self {
        if socket_open {
            Self::Connected
        } else if desired {
            Self::Reconnecting
        } else {
            Self::Disconnected
        }
    }
}

/// Snapshot delivered to `on_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub session_id: Option<String>,
    pub last_seq: u64,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
