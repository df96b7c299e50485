//! Realtime wire frames.
//!
//! Inbound frames are JSON objects with a `type` and optional sequencing
//! fields. Outbound frames are either application traffic (chat, interrupt)
//! or protocol hygiene (ack, keepalive ping).

use serde::{Deserialize, Deserializer, Serialize};

/// One parsed inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Non-integer or negative values are treated as absent
    #[serde(
        default,
        deserialize_with = "lenient_seq",
        skip_serializing_if = "Option::is_none"
    )]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_required: Option<bool>,
}

fn lenient_seq<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_u64()))
}

impl InboundFrame {
    /// Parse a text frame; `None` for anything that is not a typed JSON object
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Sequence number if this frame takes part in resume tracking
    #[inline]
    pub fn tracked_seq(&self) -> Option<u64> {
        match (self.seq, &self.server_event_id) {
            (Some(seq), Some(_)) => Some(seq),
            _ => None,
        }
    }

    /// Whether the server expects an `ACK` for this frame
    #[inline]
    pub fn wants_ack(&self) -> bool {
        self.ack_required == Some(true)
            && self.server_event_id.is_some()
            && self.seq.is_some_and(|s| s >= 1)
    }
}

/// Frames the client writes to the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "CHAT_SEND")]
    ChatSend {
        payload: ChatPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_request_id: Option<String>,
    },
    #[serde(rename = "INTERRUPT")]
    Interrupt,
    #[serde(rename = "ACK")]
    Ack { cursor: u64 },
    #[serde(rename = "PING")]
    Ping { payload: PingPayload },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    /// Epoch milliseconds
    pub ts: i64,
}

impl OutboundFrame {
    pub fn chat(text: impl Into<String>, client_request_id: Option<String>) -> Self {
        Self::ChatSend {
            payload: ChatPayload { text: text.into() },
            client_request_id,
        }
    }

    pub fn ack(cursor: u64) -> Self {
        Self::Ack { cursor }
    }

    pub fn ping_now() -> Self {
        Self::Ping {
            payload: PingPayload {
                ts: chrono::Utc::now().timestamp_millis(),
            },
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
